use std::sync::Arc;

use shortlink_shortener::{ShortCode, ShortenerService};

use crate::auth::SessionSigner;
use crate::config::Subnet;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    shortener: ShortenerService,
    signer: SessionSigner,
    base_url: String,
    trusted_subnet: Option<Subnet>,
}

impl AppState {
    pub fn new(
        shortener: ShortenerService,
        signer: SessionSigner,
        public_base_url: impl Into<String>,
        trusted_subnet: Option<Subnet>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                shortener,
                signer,
                base_url: public_base_url.into(),
                trusted_subnet,
            }),
        }
    }

    pub fn shortener(&self) -> &ShortenerService {
        &self.inner.shortener
    }

    pub fn signer(&self) -> &SessionSigner {
        &self.inner.signer
    }

    pub fn trusted_subnet(&self) -> Option<&Subnet> {
        self.inner.trusted_subnet.as_ref()
    }

    /// Full public URL of `code`.
    pub fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.inner.base_url)
    }
}
