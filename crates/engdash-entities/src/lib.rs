pub mod forest;
pub mod form;
pub mod kind;
pub mod list;
pub mod page;
pub mod ui;

pub use kind::EntityKind;
pub use page::{EntityPage, PageConfig};
