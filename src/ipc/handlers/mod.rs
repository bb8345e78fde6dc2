pub mod classes;
pub mod core;
pub mod grades;
pub mod scores;
pub mod settings;
pub mod structure;
