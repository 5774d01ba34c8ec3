pub mod comment;
pub mod member;
pub mod notification;
pub mod post;
pub mod reaction;
pub mod subscription;
