/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `users`: User directory endpoints
/// - `me`: The signed-in principal's account

pub mod health;
pub mod me;
pub mod users;
