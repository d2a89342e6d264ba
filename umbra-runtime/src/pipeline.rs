//! Seven-stage processing of one source
//!
//! transport → validation → parser → sanitizer → normalizer → extractor →
//! scorer. The first failing stage ends the run; the error records which
//! stage it came from.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use umbra_core::{
    Extractor, ExtractorConfig, FeatureInput, Features, IntelligenceInput, Normalizer,
    NormalizerConfig, Sanitizer, SanitizerConfig, ScoreResult, Scorer, ScorerConfig, Source,
    STORED_KEYWORDS,
};
use umbra_tor::{
    Fetcher, ParseError, Parser, ParserConfig, TransportError, ValidationError, Validator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Transport,
    Validation,
    Parser,
    Sanitizer,
    Normalizer,
    Extractor,
    Scorer,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transport => "transport",
            Stage::Validation => "validation",
            Stage::Parser => "parser",
            Stage::Sanitizer => "sanitizer",
            Stage::Normalizer => "normalizer",
            Stage::Extractor => "extractor",
            Stage::Scorer => "scorer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a fallible stage; the remaining stages cannot fail
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("transport stage failed: {0}")]
    Transport(#[from] TransportError),

    #[error("validation stage failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("parser stage failed: {0}")]
    Parse(#[from] ParseError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Transport(_) => Stage::Transport,
            PipelineError::Validation(_) => Stage::Validation,
            PipelineError::Parse(_) => Stage::Parser,
        }
    }
}

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct Processed {
    pub intelligence: IntelligenceInput,
    pub features: Features,
    pub score: ScoreResult,
    pub explanation: String,
    /// Sanitizer found and filtered injection patterns
    pub was_dangerous: bool,
}

#[derive(Debug)]
pub struct ProcessingResult {
    pub source_id: i64,
    pub source_url: String,
    pub outcome: Result<Processed, PipelineError>,
    /// End-to-end, measured on success and failure alike
    pub duration: Duration,
}

impl ProcessingResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        self.outcome.as_ref().err().map(PipelineError::stage)
    }
}

/// Component configs for [`Pipeline::new`]
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub parser: ParserConfig,
    pub sanitizer: SanitizerConfig,
    pub normalizer: NormalizerConfig,
    pub extractor: ExtractorConfig,
    pub scorer: ScorerConfig,
}

pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    validator: Validator,
    parser: Parser,
    sanitizer: Sanitizer,
    normalizer: Normalizer,
    extractor: Extractor,
    scorer: Scorer,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: PipelineConfig) -> Self {
        Self {
            fetcher,
            validator: Validator::default(),
            parser: Parser::new(config.parser),
            sanitizer: Sanitizer::new(config.sanitizer),
            normalizer: Normalizer::new(config.normalizer),
            extractor: Extractor::new(config.extractor),
            scorer: Scorer::new(config.scorer),
        }
    }

    /// Run every stage against `source`
    pub async fn process(&self, cancel: &CancellationToken, source: &Source) -> ProcessingResult {
        let start = Instant::now();
        let outcome = self.run(cancel, source).await;
        let duration = start.elapsed();

        match &outcome {
            Ok(processed) => info!(
                "Pipeline completed for source {} in {:?}: score {} ({})",
                source.id,
                duration,
                processed.score.score,
                processed.score.criticality
            ),
            Err(e) => error!(
                "Pipeline failed for source {} at {} stage after {:?}: {}",
                source.id,
                e.stage(),
                duration,
                e
            ),
        }

        ProcessingResult {
            source_id: source.id,
            source_url: source.url.clone(),
            outcome,
            duration,
        }
    }

    async fn run(&self, cancel: &CancellationToken, source: &Source) -> Result<Processed, PipelineError> {
        debug!("[{}] {}", Stage::Transport, source.url);
        let response = self.fetcher.fetch(cancel, &source.url).await?;

        debug!("[{}] {}", Stage::Validation, source.url);
        let validated = self.validator.validate(response).await?;

        self.analyze(source.id, &source.url, validated.body.as_bytes())
    }

    /// Parse onward: everything after the body has been fetched and validated
    pub fn analyze(&self, source_id: i64, url: &str, html: &[u8]) -> Result<Processed, PipelineError> {
        debug!("[{}] {} bytes", Stage::Parser, html.len());
        let parsed = self.parser.parse(html, url)?;

        debug!("[{}] title and content", Stage::Sanitizer);
        let title = self.sanitizer.sanitize_title(&parsed.title);
        let sanitized = self.sanitizer.sanitize(&parsed.content);

        debug!("[{}] scoring and display profiles", Stage::Normalizer);
        let scoring = self.normalizer.normalize_for_scoring(&sanitized.plain_text);
        let display = self.normalizer.normalize_for_display(&sanitized.plain_text);

        debug!("[{}] {} words", Stage::Extractor, scoring.word_count);
        let features = self.extractor.extract(&scoring.text);

        debug!("[{}] {} indicators", Stage::Scorer, features.total_matches());
        let (score, explanation) = self.scorer.score_with_explanation(&features, &scoring.text);

        let intelligence = IntelligenceInput {
            source_id,
            title,
            summary: display.text,
            source_url: url.to_string(),
            criticality_score: score.score,
            published_at: parsed.published_at,
            features: feature_input(&features),
        };

        Ok(Processed {
            intelligence,
            features,
            score,
            explanation,
            was_dangerous: sanitized.was_dangerous,
        })
    }
}

/// Indicator lists verbatim, keywords cut to the first [`STORED_KEYWORDS`]
fn feature_input(features: &Features) -> FeatureInput {
    FeatureInput {
        bitcoin_addrs: features.bitcoin_addrs.clone(),
        ethereum_addrs: features.ethereum_addrs.clone(),
        monero_addrs: features.monero_addrs.clone(),
        onion_urls: features.onion_urls.clone(),
        ip_addresses: features.ip_addresses.clone(),
        domains: features.domains.clone(),
        emails: features.emails.clone(),
        phones: features.phones.clone(),
        cves: features.cves.clone(),
        keywords: features.keywords.iter().take(STORED_KEYWORDS).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::Criticality;
    use umbra_tor::{TorClient, TorConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const THREAT_PAGE: &str = r#"<html>
<head><title>Leak forum</title><script>track()</script></head>
<body>
  <div class="post-header"><h1>New ransomware builder with 0day exploit</h1></div>
  <span class="username">vendor</span>
  <time datetime="2024-03-15T10:30:00Z"></time>
  <div class="post-content">
    <p>New ransomware strain released with a working 0day exploit and full rootkit.</p>
    <p>Targets CVE-2024-1234 and CVE-2023-4567 on unpatched servers.</p>
    <p>Mirror at dreadytofatroptsdj6io7l3xptbet6onoyno2yv7jicoxknyazubrad.onion
       or contact seller@darkmail.net from 185.220.101.4 only.</p>
  </div>
</body>
</html>"#;

    fn pipeline() -> Pipeline {
        let client = TorClient::new(TorConfig::direct()).unwrap();
        Pipeline::new(Arc::new(client), PipelineConfig::default())
    }

    #[test]
    fn test_analyze_threat_page() {
        let processed = pipeline()
            .analyze(7, "http://leaks.onion/t/1", THREAT_PAGE.as_bytes())
            .unwrap();

        let intel = &processed.intelligence;
        assert_eq!(intel.source_id, 7);
        assert_eq!(intel.title, "New ransomware builder with 0day exploit");
        assert_eq!(intel.source_url, "http://leaks.onion/t/1");
        assert!(intel.published_at.is_some());
        assert!(intel.summary.starts_with("New ransomware strain released"));
        assert_eq!(intel.features.cves.len(), 2);
        assert_eq!(intel.features.onion_urls.len(), 1);
        assert_eq!(intel.features.emails, vec!["seller@darkmail.net"]);
        assert_eq!(intel.features.ip_addresses, vec!["185.220.101.4"]);
        assert!(intel.features.keywords.len() <= STORED_KEYWORDS);
        assert_eq!(processed.score.criticality, Criticality::Critical);
        assert_eq!(intel.criticality_score, processed.score.score);
    }

    #[test]
    fn test_stored_keywords_truncated_not_resorted() {
        let features = Features {
            keywords: (0..30).map(|i| format!("kw{i:02}")).collect(),
            ..Default::default()
        };
        let input = feature_input(&features);
        assert_eq!(input.keywords.len(), STORED_KEYWORDS);
        assert_eq!(input.keywords[0], "kw00");
        assert_eq!(input.keywords[19], "kw19");
    }

    #[tokio::test]
    async fn test_process_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thread"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(THREAT_PAGE, "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let source = Source::new(3, "forum", &format!("{}/thread", server.uri()));
        let result = pipeline().process(&CancellationToken::new(), &source).await;

        assert!(result.is_success());
        assert_eq!(result.source_id, 3);
        assert!(result.failed_stage().is_none());
    }

    #[tokio::test]
    async fn test_process_fails_at_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source = Source::new(1, "gone", &server.uri());
        let result = pipeline().process(&CancellationToken::new(), &source).await;
        assert_eq!(result.failed_stage(), Some(Stage::Transport));
    }

    #[tokio::test]
    async fn test_process_fails_at_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>tiny</p>", "text/html"))
            .mount(&server)
            .await;

        let source = Source::new(1, "tiny", &server.uri());
        let result = pipeline().process(&CancellationToken::new(), &source).await;

        assert_eq!(result.failed_stage(), Some(Stage::Validation));
        assert!(matches!(
            result.outcome,
            Err(PipelineError::Validation(ValidationError::BodyEmpty(_)))
        ));
    }
}
