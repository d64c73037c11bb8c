pub mod collection;
pub mod inscription;
pub mod list;
pub mod page;
pub mod token;

pub use collection::{Collection, SigField, SignaturePolicy};
pub use inscription::{InscriptionRecord, InscriptionsListing};
pub use list::{parse_order, ListOptions, OrderBy};
pub use page::{Page, PageRecord};
pub use token::{MintSignatureRecord, Token};
