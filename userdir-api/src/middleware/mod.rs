/// Middleware modules for the API server
///
/// - `principal`: Optional bearer-token principal extraction

pub mod principal;
