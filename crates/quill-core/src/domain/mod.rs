//! Domain entities - the core business objects.

mod post;
mod user;

pub use post::{AuthorRef, Post, PostChanges, PostDetails};
pub use user::User;
