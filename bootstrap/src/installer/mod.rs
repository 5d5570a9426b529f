pub mod apt;
