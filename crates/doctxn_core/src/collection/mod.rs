//! Collections: documents, indexes, filters and the checks that guard them.

mod filter;
mod index;
mod state;
mod validate;

pub use filter::Filter;
pub use index::{IndexSpec, ID_INDEX_NAME};
pub use validate::{assign_id, validate_collection_name, validate_document};

pub(crate) use index::{admit_index, undroppable, IndexState};
pub(crate) use state::{CollectionState, RecordId};
