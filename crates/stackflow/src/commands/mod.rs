pub mod apply;
pub mod destroy;
pub mod validate;
