pub mod install;
pub mod installed;
pub mod launch;
pub mod list;
pub mod select;
pub mod uninstall;
pub mod verify;
