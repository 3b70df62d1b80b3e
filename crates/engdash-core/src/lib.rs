pub mod ancestry;
pub mod config;
pub mod dropdown;
pub mod finder;
pub mod help_popup;
pub mod keybinds;
pub mod listing;
pub mod logging;
pub mod nav;
pub mod option_tree;
pub mod page;
pub mod session;
pub mod ui;
pub mod which_key;
