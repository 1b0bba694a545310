pub mod faketime_clock;

pub use faketime_clock::FaketimeFileClock;
