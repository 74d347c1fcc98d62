//! Behavioural suites driving a real server over loopback sockets.

mod support;
