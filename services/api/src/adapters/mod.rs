pub mod clock;
pub mod db;
pub mod memory;

pub use clock::{ManualClock, SystemClock};
pub use db::DbAdapter;
pub use memory::InMemoryStore;
