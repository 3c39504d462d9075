mod advance;
mod cash_box;
mod entry;
mod ledger;
mod money;
mod registry;
mod text;

pub use advance::*;
pub use cash_box::*;
pub use entry::*;
pub use ledger::*;
pub use money::*;
pub use registry::*;
pub use text::*;
