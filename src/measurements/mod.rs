pub mod city_selector;
pub mod error;
pub mod importer;
pub mod reshape;
