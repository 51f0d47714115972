//! SQL generation: the condition compiler, parameterized statement builders
//! and row decoding, all driven by the boot-time table descriptors.

pub mod builder;
pub mod decode;
pub mod params;
pub mod predicate;

pub use builder::QueryBuf;
pub use decode::row_to_record;
pub use params::PgBindValue;
pub use predicate::{compile, CompiledQuery};
