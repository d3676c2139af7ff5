//! One-shot sweep of the record directory.

use crate::cli::IndexArgs;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::indexer::Indexer;
use crate::storage::Store;

pub fn execute(conf: &ConfigStore, args: &IndexArgs) -> Result<()> {
    conf.ensure_layout()?;
    let record_path = args
        .record_path
        .clone()
        .unwrap_or_else(|| conf.record_path());
    let store = Store::open(&conf.db_path())?;
    let mut indexer = Indexer::new(store, record_path, args.check_duplicate, args.keep_json);
    let count = indexer.index_all()?;
    println!("Indexed {count} record(s)");
    Ok(())
}
