pub mod model_pull;
