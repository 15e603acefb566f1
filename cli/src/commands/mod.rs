pub(crate) mod dump;
pub(crate) mod show;

pub(crate) use dump::command_dump;
pub(crate) use show::command_show;
