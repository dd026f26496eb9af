//! Test utilities for exercising the client against a scripted daemon on a loopback socket.

pub mod daemon;
