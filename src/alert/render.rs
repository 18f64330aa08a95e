use std::sync::Arc;

use async_trait::async_trait;
use tiny_skia::Pixmap;
use tracing::{debug, info};
use usvg::fontdb::Database;
use usvg::{Options, Tree};

use super::{RenderError, Renderer};
use crate::registry::TrackedAccount;
use crate::riot::{MatchDetail, MatchDto, TftMatchDto};

const LOL_TEMPLATE: &str = include_str!("../../assets/lol_card.svg");
const TFT_TEMPLATE: &str = include_str!("../../assets/tft_card.svg");

/// Renders match cards from the SVG templates under `assets/`.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    fontdb: Arc<Database>,
}

impl SvgRenderer {
    pub fn new() -> Self {
        let mut fontdb = Database::new();
        fontdb.load_system_fonts();
        info!(font_count = fontdb.len(), "🖼️ Loaded system fonts");

        Self::with_fontdb(fontdb)
    }

    pub fn with_fontdb(fontdb: Database) -> Self {
        Self {
            fontdb: Arc::new(fontdb),
        }
    }

    fn build_svg(account: &TrackedAccount, detail: &MatchDetail) -> Result<String, RenderError> {
        match detail {
            MatchDetail::Lol(m) => lol_svg(account, m),
            MatchDetail::Tft(m) => tft_svg(account, m),
        }
    }
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for SvgRenderer {
    async fn render(
        &self,
        account: &TrackedAccount,
        detail: &MatchDetail,
    ) -> Result<Vec<u8>, RenderError> {
        let svg = Self::build_svg(account, detail)?;
        let fontdb = self.fontdb.clone();

        // Rasterizing is CPU bound.
        tokio::task::spawn_blocking(move || rasterize(&svg, fontdb))
            .await
            .map_err(|e| RenderError::Interrupted(e.to_string()))?
    }
}

fn lol_svg(account: &TrackedAccount, m: &MatchDto) -> Result<String, RenderError> {
    let participant = m
        .participant(&account.puuid)
        .ok_or_else(|| RenderError::NotInMatch {
            riot_id: account.riot_id(),
            match_id: m.metadata.match_id.clone(),
        })?;

    let (banner, color, result) = if m.info.game_ended_in_early_surrender {
        ("url(#remakeGradient)", "#a09b8c", "REMAKE")
    } else if participant.win {
        ("url(#victoryGradient)", "#0ac8b9", "VICTORY")
    } else {
        ("url(#defeatGradient)", "#e84057", "DEFEAT")
    };

    Ok(LOL_TEMPLATE
        .replace("{{banner_gradient}}", banner)
        .replace("{{result_color}}", color)
        .replace("{{result_text}}", result)
        .replace("{{queue_type}}", m.info.queue_name())
        .replace("{{duration}}", &m.info.duration_formatted())
        .replace("{{player_name}}", &escape(&account.riot_id()))
        .replace("{{champion_name}}", &escape(&participant.champion_name))
        .replace("{{role}}", participant.position_display())
        .replace("{{kills}}", &participant.kills.to_string())
        .replace("{{deaths}}", &participant.deaths.to_string())
        .replace("{{assists}}", &participant.assists.to_string())
        .replace("{{kda_ratio}}", &format!("{:.2}", participant.kda_ratio()))
        .replace("{{cs}}", &participant.cs_total().to_string()))
}

fn tft_svg(account: &TrackedAccount, m: &TftMatchDto) -> Result<String, RenderError> {
    let participant = m
        .participant(&account.puuid)
        .ok_or_else(|| RenderError::NotInMatch {
            riot_id: account.riot_id(),
            match_id: m.metadata.match_id.clone(),
        })?;

    let (banner, color) = if participant.is_top_four() {
        ("url(#topGradient)", "#c8aa6e")
    } else {
        ("url(#bottomGradient)", "#a09b8c")
    };

    Ok(TFT_TEMPLATE
        .replace("{{banner_gradient}}", banner)
        .replace("{{result_color}}", color)
        .replace("{{placement}}", &participant.placement_ordinal().to_uppercase())
        .replace("{{queue_type}}", m.info.queue_name())
        .replace("{{duration}}", &m.info.duration_formatted())
        .replace("{{player_name}}", &escape(&account.riot_id()))
        .replace("{{set_number}}", &m.info.tft_set_number.to_string())
        .replace("{{level}}", &participant.level.to_string())
        .replace("{{last_round}}", &participant.last_round.to_string())
        .replace("{{damage}}", &participant.total_damage_to_players.to_string()))
}

fn rasterize(svg: &str, fontdb: Arc<Database>) -> Result<Vec<u8>, RenderError> {
    let options = Options {
        fontdb,
        ..Default::default()
    };

    let tree = Tree::from_str(svg, &options).map_err(|e| RenderError::Svg(e.to_string()))?;

    let size = tree.size();
    let width = size.width() as u32;
    let height = size.height() as u32;

    let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Pixmap { width, height })?;

    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let png = pixmap
        .encode_png()
        .map_err(|e| RenderError::Encode(e.to_string()))?;

    debug!(width, height, size = png.len(), "🖼️ ✅ Image generated");
    Ok(png)
}

/// Riot ids may contain characters that are markup in SVG.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
