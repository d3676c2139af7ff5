//! Print the path of a well-known file.

use crate::config::{ConfigStore, LocateTarget};
use crate::error::Result;

pub fn execute(conf: &ConfigStore, target: LocateTarget) -> Result<()> {
    println!("{}", conf.locate(target).display());
    Ok(())
}
