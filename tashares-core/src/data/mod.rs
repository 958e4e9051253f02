//! Data ingestion: ground-truth tables, symbol lists and concrete job units.

pub mod fragment_dir;
pub mod load;
pub mod symbols;
pub mod synthetic;

pub use fragment_dir::{fragment_path, write_fragment, FragmentDirJob};
pub use load::{load_data, read_tsv, upgrade_targets, LoadError};
pub use symbols::read_symbol_list;
pub use synthetic::SyntheticJob;
