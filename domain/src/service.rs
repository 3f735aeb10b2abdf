use crate::analytics::{self, LinkStats, OverallStats};
use crate::validate::validate_original_url;
use crate::{
    ClickData, Clock, CodeGenerator, CoreError, NewShortUrl, ShortCode, ShortUrl, UrlRepository,
    DEFAULT_VALIDITY_MINUTES,
};

/// Application service orchestrating creation, resolution, and click
/// tracking of short URLs.
///
/// It remains generic over repository, code generator, and clock so the
/// domain stays testable without external dependencies. The repository is
/// the reconciliation point for uniqueness: custom codes are checked against
/// it directly, generated codes against its current code set.
pub struct ShortenerService<R: UrlRepository, G: CodeGenerator, C: Clock> {
    repo: R,
    generator: G,
    clock: C,
    base_url: String,
}

impl<R: UrlRepository, G: CodeGenerator, C: Clock> ShortenerService<R, G, C> {
    pub fn new(repo: R, generator: G, clock: C, base_url: impl Into<String>) -> Self {
        Self {
            repo,
            generator,
            clock,
            base_url: base_url.into(),
        }
    }

    /// Create a new short URL.
    pub fn create(&self, input: NewShortUrl) -> Result<ShortUrl, CoreError> {
        let url_issues = validate_original_url(&input.original_url);
        if !url_issues.is_empty() {
            return Err(CoreError::InvalidUrl(url_issues));
        }

        let validity = input.validity_minutes.unwrap_or(DEFAULT_VALIDITY_MINUTES);

        let (code, custom) = match input.custom_code {
            Some(ref custom) => {
                let code = ShortCode::new(custom.clone())?;
                if self.repo.get(&code)?.is_some() {
                    return Err(CoreError::AlreadyExists);
                }
                (code, Some(custom.clone()))
            }
            None => {
                let existing = self.repo.existing_codes()?;
                (self.generator.generate(&existing)?, None)
            }
        };

        let link = ShortUrl::new(
            input.original_url,
            code.clone(),
            self.build_short_url(&code),
            validity,
            custom,
            self.clock.now(),
        );
        self.repo.insert(link.clone())?;
        Ok(link)
    }

    /// Create several short URLs, each validated and persisted
    /// independently. Outcomes are returned in input order regardless of
    /// individual failures.
    pub fn create_many(&self, inputs: Vec<NewShortUrl>) -> Vec<Result<ShortUrl, CoreError>> {
        inputs.into_iter().map(|input| self.create(input)).collect()
    }

    /// Resolve a code to its original URL. Expired links resolve to
    /// `Expired`, not `NotFound`, so the caller can answer 410 rather
    /// than 404.
    pub fn resolve(&self, code: &ShortCode) -> Result<String, CoreError> {
        match self.repo.get(code)? {
            Some(link) if link.is_expired(self.clock.now()) => Err(CoreError::Expired),
            Some(link) => Ok(link.original_url),
            None => Err(CoreError::NotFound),
        }
    }

    /// Get a link by code (exposes repo.get for stats and click workflows).
    pub fn get(&self, code: &ShortCode) -> Result<Option<ShortUrl>, CoreError> {
        self.repo.get(code)
    }

    /// Record one visit against a link.
    pub fn record_click(&self, code: &ShortCode, click: ClickData) -> Result<(), CoreError> {
        self.repo.record_click(code, click)
    }

    /// List links that are still within their validity window. Expired
    /// entries are filtered here, at read time; they stay in storage until
    /// explicitly deleted.
    pub fn list_active(&self, limit: usize) -> Result<Vec<ShortUrl>, CoreError> {
        let now = self.clock.now();
        let mut active: Vec<ShortUrl> = self
            .repo
            .list(usize::MAX)?
            .into_iter()
            .filter(|l| l.is_active(now))
            .collect();
        active.truncate(limit);
        Ok(active)
    }

    /// User-initiated cleanup of a single link.
    pub fn delete(&self, code: &ShortCode) -> Result<(), CoreError> {
        self.repo.delete(code)
    }

    /// Per-link statistics.
    pub fn stats(&self, code: &ShortCode) -> Result<LinkStats, CoreError> {
        match self.repo.get(code)? {
            Some(link) => Ok(analytics::link_stats(&link)),
            None => Err(CoreError::NotFound),
        }
    }

    /// Collection-wide statistics.
    pub fn overall_stats(&self) -> Result<OverallStats, CoreError> {
        let links = self.repo.list(usize::MAX)?;
        Ok(analytics::overall_stats(&links, self.clock.now()))
    }

    fn build_short_url(&self, code: &ShortCode) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;
    use crate::codegen::RandomCodeGenerator;
    use crate::validate::CodeIssue;
    use std::time::{Duration, SystemTime};

    struct TestClock;
    impl Clock for TestClock {
        fn now(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
    }

    fn svc() -> ShortenerService<InMemoryRepo, RandomCodeGenerator, TestClock> {
        ShortenerService::new(
            InMemoryRepo::new(),
            RandomCodeGenerator::default(),
            TestClock,
            "https://sho.rt",
        )
    }

    fn input(url: &str) -> NewShortUrl {
        NewShortUrl {
            original_url: url.to_string(),
            custom_code: None,
            validity_minutes: None,
        }
    }

    #[test]
    fn create_auto_generates_and_resolves() {
        let svc = svc();
        let created = svc.create(input("https://example.com")).expect("created");
        assert_eq!(
            created.short_url,
            format!("https://sho.rt/{}", created.short_code.as_str())
        );
        let url = svc.resolve(&created.short_code).expect("resolved");
        assert_eq!(url, "https://example.com");
    }

    #[test]
    fn create_with_custom_code_and_collision() {
        let svc = svc();
        let a = NewShortUrl {
            original_url: "https://one.example".to_string(),
            custom_code: Some("custom-1".to_string()),
            validity_minutes: None,
        };
        let created = svc.create(a).expect("created");
        assert_eq!(created.custom_code.as_deref(), Some("custom-1"));

        let b = NewShortUrl {
            original_url: "https://two.example".to_string(),
            custom_code: Some("custom-1".to_string()),
            validity_minutes: None,
        };
        let err = svc.create(b).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[test]
    fn create_rejects_reserved_custom_code() {
        let svc = svc();
        let err = svc
            .create(NewShortUrl {
                original_url: "https://example.com".to_string(),
                custom_code: Some("admin".to_string()),
                validity_minutes: None,
            })
            .unwrap_err();
        match err {
            CoreError::InvalidCode(issues) => assert!(issues.contains(&CodeIssue::Reserved)),
            other => panic!("expected InvalidCode, got {other:?}"),
        }
    }

    #[test]
    fn create_many_returns_results_in_input_order() {
        let svc = svc();
        let results = svc.create_many(vec![
            input("https://a.example"),
            input("not-a-url"),
            input("https://c.example"),
        ]);
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().expect("first ok").original_url,
            "https://a.example"
        );
        assert!(matches!(results[1], Err(CoreError::InvalidUrl(_))));
        assert_eq!(
            results[2].as_ref().expect("third ok").original_url,
            "https://c.example"
        );
    }

    #[test]
    fn resolve_not_found() {
        let svc = svc();
        let missing = ShortCode::new("missing1").expect("valid");
        let err = svc.resolve(&missing).unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[test]
    fn expired_links_resolve_to_expired_and_drop_from_active_view() {
        struct LateClock;
        impl Clock for LateClock {
            fn now(&self) -> SystemTime {
                // One second past the 30 minute default window
                SystemTime::UNIX_EPOCH + Duration::from_secs(30 * 60 + 1)
            }
        }

        // Seed a link created at the epoch, then read with the late clock
        let repo = InMemoryRepo::new();
        let code = ShortCode::new("abcdef").expect("valid");
        repo.insert(ShortUrl::new(
            "https://example.com".to_string(),
            code.clone(),
            "https://sho.rt/abcdef".to_string(),
            30,
            None,
            SystemTime::UNIX_EPOCH,
        ))
        .expect("seeded");

        let late = ShortenerService::new(
            repo,
            RandomCodeGenerator::default(),
            LateClock,
            "https://sho.rt",
        );
        let err = late.resolve(&code).unwrap_err();
        assert!(matches!(err, CoreError::Expired));
        assert!(late.list_active(10).expect("listed").is_empty());
        // Still in storage, just filtered from the view
        assert!(late.get(&code).expect("get").is_some());
    }

    #[test]
    fn record_click_bumps_count() {
        let svc = svc();
        let created = svc.create(input("https://example.com")).expect("created");
        svc.record_click(
            &created.short_code,
            ClickData::new(
                SystemTime::UNIX_EPOCH,
                "direct".to_string(),
                "unknown".to_string(),
                None,
                None,
            ),
        )
        .expect("recorded");
        let got = svc.get(&created.short_code).expect("get").expect("present");
        assert_eq!(got.click_count, 1);
        assert_eq!(got.clicks.len(), 1);
    }

    #[test]
    fn delete_removes_link() {
        let svc = svc();
        let created = svc.create(input("https://example.com")).expect("created");
        svc.delete(&created.short_code).expect("deleted");
        assert!(svc.get(&created.short_code).expect("get").is_none());
    }
}
