mod bringup;
mod common;
mod homing;
mod motion;
mod safety;
