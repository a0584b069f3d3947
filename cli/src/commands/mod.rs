mod helpers;
mod household;
mod items;
mod sync;

pub(crate) use household::{cmd_household_join, cmd_household_leave, cmd_household_show};
pub(crate) use items::{cmd_add, cmd_alerts, cmd_edit, cmd_list, cmd_notified};
pub(crate) use sync::{cmd_delete, cmd_stats, cmd_sync};
