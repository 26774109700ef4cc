pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod ports;

pub mod models {
    pub mod role;
    pub mod profile;
    pub mod session;
    pub mod auth_state;
}

pub mod auth {
    pub mod navigation;
    pub mod machine;
    pub mod gate;
    pub mod registry;
}

pub mod session {
    pub mod bus;
    pub mod redis_store;
}

pub mod repositories {
    pub mod profile;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod profiles;
}

pub mod handlers {
    pub mod auth;
    pub mod profiles;
    pub mod pages;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod gate;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}
