//! Typed record model (§3/§4.B): field type descriptors, record metadata and
//! layout, an unowned record reference, stream encode/decode for result rows,
//! and order-preserving key encoding. Ported from jogasaki's `meta` and
//! `accessor` namespaces.

pub mod comparator;
pub mod copier;
pub mod field_type;
pub mod key;
pub mod meta;
pub mod record_ref;
pub mod stream;
pub mod value;

pub use comparator::{FieldOrder, RecordComparator};
pub use copier::{CopyMode, RecordCopier};
pub use field_type::FieldType;
pub use key::{NullsOrder, SortOrder};
pub use meta::RecordMeta;
pub use record_ref::RecordRef;
pub use stream::StreamValue;
pub use value::{Date, Decimal, FieldCodec, LobRef, TimeOfDay, TimePoint, VarlenValue};
