mod chat_service;
mod user_service;


pub use chat_service::{ChatService, ChatServiceDependencies, SubscriptionSettings};
pub use user_service::{
    AuthenticateUserRequest, RegisterUserRequest, UpdateProfileRequest, UserService,
    UserServiceDependencies,
};
