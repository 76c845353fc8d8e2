#[macro_use]
extern crate num_derive;
extern crate num_traits;

pub mod zisk;
