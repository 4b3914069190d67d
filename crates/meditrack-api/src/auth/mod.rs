//! Authentication
//!
//! - Token issuing and verification (HS256 JWT)
//! - Password hashing with Argon2id
//! - Middleware that turns a bearer token into an [`AuthContext`]
//! - Account service for signup, login and profile updates

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use jwt::{Claims, IssuedToken, JwtError, TokenService};
pub use middleware::{auth_middleware, AuthContext};
pub use password::{hash_password, validate_password_strength, verify_password, PasswordError};
pub use service::{AuthResponse, AuthService, LoginRequest, ProfileUpdateRequest, SignupRequest};
