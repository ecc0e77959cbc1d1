use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::version::Version;

/// A record shape tied to one schema version.
///
/// Every historical shape of a document is its own type. The
/// `#[schema(version = "M.P")]` attribute generates this implementation and
/// checks the version literal at compile time.
pub trait Schema: Serialize + DeserializeOwned {
    /// The version this shape represents.
    const VERSION: Version;
}

/// The closed set of shapes a document may take.
///
/// Implemented by an enum with one variant per registered [`Schema`]
/// record; `#[derive(Document)]` generates it together with the
/// `From<Record>` and `TryFrom<Self>` conversions used to narrow a document
/// to one shape. The tag reported by [`Document::version`] always matches
/// the variant actually held.
pub trait Document: Sized {
    /// The schema version of the held variant.
    fn version(&self) -> Version;
}
