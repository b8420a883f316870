//! # PPM Bridge Library
//!
//! Drive an RC car from a racing wheel, pedals and handbrake.
//!
//! This library provides the core functionality for bridging evdev input
//! devices (and optionally a decoded serial receiver) to an 8-channel PPM
//! signal generated by the pigpio daemon.

pub mod config;
pub mod control;
pub mod controller;
pub mod error;
pub mod pigpio;
pub mod ppm;
pub mod receiver;
pub mod telemetry;
