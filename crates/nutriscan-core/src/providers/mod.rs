// Product source implementations
pub mod nutrition_api;

pub use nutrition_api::NutritionApiSource;
