mod entry;
mod goals;
mod helpers;
mod import;
mod summary;
mod sync;

use intake_core::db::Database;
use intake_core::service::IntakeService;

pub(crate) type Service = IntakeService<Database>;

pub(crate) use entry::{EntryArgs, cmd_add, cmd_delete, cmd_edit, cmd_reset};
pub(crate) use goals::{cmd_goals_set, cmd_goals_show};
pub(crate) use import::{cmd_export, cmd_import};
pub(crate) use summary::{cmd_history, cmd_summary};
pub(crate) use sync::{cmd_sync_pull, cmd_sync_status};
