pub mod feed;
pub mod folder;
pub mod item;
pub mod status;

pub use feed::{Feed, FeedScope, FeedUpdate, Validators};
pub use folder::Folder;
pub use item::Item;
pub use status::StatusFlag;
