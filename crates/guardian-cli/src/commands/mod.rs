pub mod ai;
pub mod check;
pub mod helpers;
pub mod run;
pub mod session;
pub mod settings;
