pub mod aggregate;
pub mod award;
pub mod cancel;
pub mod config;
pub mod names;
pub mod pipeline;
pub mod reference;
pub mod table;
