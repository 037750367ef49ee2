//! Shared application state.

use crate::config::{CookieConfig, PaymentConfig};
use crate::realtime::RealtimeHub;
use coursehub_catalog::{
    CourseCache, CourseService, CourseStore, NotificationStore, OrderStore, PaymentProcessor,
    PurchaseEngine, SideEffectQueue, UserStore, VideoProvider,
};
use coursehub_platform_access::{Authenticator, KeyValueCache, SessionStore, TokenCodec};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// External systems the server talks to, constructed once in `main`.
pub struct Backends {
    pub cache: Arc<dyn KeyValueCache>,
    pub users: Arc<dyn UserStore>,
    pub courses: Arc<dyn CourseStore>,
    pub orders: Arc<dyn OrderStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub side_effects: Arc<dyn SideEffectQueue>,
    pub video: Arc<dyn VideoProvider>,
}

/// State shared by every handler through `Arc<AppState>`.
pub struct AppState {
    pub authenticator: Authenticator,
    pub courses: CourseService,
    pub purchases: PurchaseEngine,
    pub orders: Arc<dyn OrderStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub video: Arc<dyn VideoProvider>,
    pub payment: PaymentConfig,
    pub cookies: CookieConfig,
    pub realtime: RealtimeHub,
}

impl AppState {
    /// Wires the services over the given backends.
    ///
    /// Sessions expire with the refresh token, so an abandoned session does
    /// not outlive the last credential able to use it.
    #[must_use]
    pub fn new(
        backends: Backends,
        codec: TokenCodec,
        course_ttl: Duration,
        payment: PaymentConfig,
        cookies: CookieConfig,
    ) -> Self {
        let mut sessions = SessionStore::new(Arc::clone(&backends.cache));
        match codec.refresh_lifetime().to_std() {
            Ok(ttl) => sessions = sessions.with_ttl(ttl),
            Err(e) => warn!(error = %e, "refresh lifetime is negative, sessions will not expire"),
        }

        let course_cache =
            CourseCache::new(Arc::clone(&backends.cache), backends.courses).with_ttl(course_ttl);

        let courses = CourseService::new(course_cache.clone(), Arc::clone(&backends.side_effects));
        let purchases = PurchaseEngine::new(
            Arc::clone(&backends.payments),
            backends.users,
            course_cache,
            Arc::clone(&backends.orders),
            sessions.clone(),
            backends.side_effects,
        );

        Self {
            authenticator: Authenticator::new(codec, sessions),
            courses,
            purchases,
            orders: backends.orders,
            notifications: backends.notifications,
            payments: backends.payments,
            video: backends.video,
            payment,
            cookies,
            realtime: RealtimeHub::new(),
        }
    }
}
