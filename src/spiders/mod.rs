//! Site spiders
//!
//! Each spider implements [`crate::spider::Spider`] for one job board.

mod easynomad;

pub use easynomad::{EasyNomadSpider, EASYNOMAD_LIST_URL, EASYNOMAD_SOURCE};

use crate::config::Config;
use crate::entity::JobEntity;
use crate::spider::{CrawlEngine, CrawlOutcome, HttpTransport, TransportConfig};

/// Looks up a spider's canonical name
///
/// # Returns
///
/// The canonical name if `name` matches a known spider (case-insensitive)
pub fn canonical_spider_name(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "easynomad" | "easynomad.cn" => Some("easynomad"),
        _ => None,
    }
}

/// Names of all available spiders
pub const SPIDER_NAMES: [&str; 1] = ["easynomad"];

/// Runs the configured spider and saves what it finds
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `max_pages` - Page cap for this run (usually `config.spider.max_pages`); `None` for no cap
///
/// # Returns
///
/// * `Ok(CrawlOutcome)` - Crawl report and save counts
/// * `Err(HarvestError)` - Bad output configuration, client setup or save failure
pub async fn harvest(
    config: &Config,
    max_pages: Option<usize>,
) -> crate::Result<CrawlOutcome<JobEntity>> {
    let options = config.output.save_options()?;

    let spider = match &config.spider.start_url {
        Some(url) => EasyNomadSpider::with_start_url(url.clone()),
        None => EasyNomadSpider::new(),
    };
    let transport = HttpTransport::new(&TransportConfig::from(&config.spider), &spider)?;

    let mut engine = CrawlEngine::new(spider, transport, config.spider.delay());
    let outcome = engine.crawl_and_save(max_pages, &options).await;
    engine.close();

    Ok(outcome?)
}
