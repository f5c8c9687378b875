pub mod datadog;
pub mod google_maps;
