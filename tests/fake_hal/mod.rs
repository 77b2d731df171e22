#![allow(dead_code)]

pub mod critical;
pub mod delay;
pub mod digital;
pub mod i2c;
