pub mod auth;
pub mod ctf;
pub mod toolbox;
pub mod watch;
