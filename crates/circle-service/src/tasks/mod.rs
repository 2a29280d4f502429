//! Background tasks for the circle service.
//!
//! - `keeper_absence` - Ends sessions whose keeper never joined

pub mod keeper_absence;

pub use keeper_absence::{
    run_keeper_absence_check, start_keeper_absence_task, KeeperAbsenceConfig,
};
