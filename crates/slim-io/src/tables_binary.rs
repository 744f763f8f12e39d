//! Table-collection binary format: a single kastore file, the format
//! `tskit::TableCollection::dump`/`load` natively speak. The ancestral
//! sequence rides along as the store's `reference_sequence/data` key
//! (spec §4.6, §6's "kastore" entry), which is just the table
//! collection's own reference-sequence slot.

use slim_error::Result;
use std::path::Path;

pub fn write_tables_binary(path: &Path, tables: &tskit::TableCollection) -> Result<()> {
    tables
        .dump(path.to_string_lossy().as_ref(), tskit::TableOutputOptions::default())
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to write kastore table collection to {}: {e}", path.display()))?;
    Ok(())
}

pub fn read_tables_binary(path: &Path) -> Result<tskit::TableCollection> {
    tskit::TableCollection::new_from_file(path.to_string_lossy().as_ref())
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to read kastore table collection from {}: {e}", path.display()))
}
