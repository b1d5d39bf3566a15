//! Keys, records and blocks shared by the resolution engine and its collaborators.

mod block;
mod query_key;
mod rdata;
mod record;
mod timestamp;
mod zone;

pub use block::*;
pub use query_key::*;
pub use rdata::*;
pub use record::*;
pub use timestamp::*;
pub use zone::*;
