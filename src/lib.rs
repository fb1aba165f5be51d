pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::energy_api::EnergyApi;
pub use application::monitor::{
    watch_live_status, watch_power_history, PollHandle, HISTORY_INTERVAL, LIVE_STATUS_INTERVAL,
};
pub use application::sign_in::{AuthorizeUrlHandler, PkceChallenge, SignInFlow, SignInPhase};
pub use application::token_manager::TokenManager;
pub use domain::models::{
    EnergyHistory, EnergySample, EnergySiteProduct, GraphPreferences, GridStatus, LiveStatus,
    PowerHistory, PowerSample, Product, SelfConsumptionHistory, SelfConsumptionSample, Site,
    SiteStatus, TimePeriod, Token, Vehicle,
};
pub use infrastructure::auth_client::AuthClient;
pub use infrastructure::config::ApiConfig;
pub use infrastructure::error::ApiError;
pub use infrastructure::http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use infrastructure::secure_store::{InMemorySecureStore, KeyringSecureStore, SecureStore};
pub use infrastructure::session_store::{SessionEvent, SessionStore};
