pub mod attributes;
pub mod coordinator;
pub mod legend;
pub mod my_app;
