//! The association table: a chained hash index with incremental expansion.
//!
//! Items are chained per bucket through links stored in the items themselves
//! (see [`ItemTable`](../trait.ItemTable.html)). The bucket array doubles when
//! the load factor passes 1.5. Rather than rehashing everything at once, the
//! maintenance worker publishes a new array twice the size, keeps the old one
//! next to it, and migrates one old bucket at a time under that bucket's item
//! lock. A cursor tracks the migration; requests for a digest whose old bucket
//! is below the cursor go to the new array, all others to the old one.

pub(crate) mod bucket_array;
pub(crate) mod builder;
pub(crate) mod chain;
pub(crate) mod index;
pub(crate) mod iter;
pub(crate) mod maintenance;
pub(crate) mod table_set;

pub use builder::AssocIndexBuilder;
pub use index::AssocIndex;
pub use iter::AssocIter;
