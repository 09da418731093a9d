pub mod log;
pub mod console;
pub mod filesystem;
pub mod result;

pub extern crate thiserror;

// global logger macro, `log` is taken by the module above
extern crate log as glog;
