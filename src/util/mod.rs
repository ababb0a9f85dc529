//! Small helpers shared by the terminal view.

pub mod time_ago;
