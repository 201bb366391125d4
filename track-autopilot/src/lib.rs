pub mod benchmark;
pub mod brain;
pub mod runner;
pub mod util;
