pub mod run;
pub mod view;
