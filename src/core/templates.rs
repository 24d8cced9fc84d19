use minijinja::{context, Environment, Template};
use once_cell::sync::Lazy;
use serde::Serialize;
use strum::{EnumIter, IntoEnumIterator};
use tracing::info;

use crate::core::{leaderboard::StatRow, stats::StatsSnapshot};
use crate::error::StatsResult;
use crate::logs::LogStats;

static TEMPLATES_ENVIRONMENT: Lazy<Environment> = Lazy::new(|| {
    info!("Initializing templating engine environment.");
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);

    // Use strum to iterate over the variants of the enum.
    for template in ReportTemplate::iter() {
        if let Err(e) = env.add_template(template.name(), template.template()) {
            tracing::error!("Could not load template {}: {e}", template.name());
        }
    }

    env
});

#[derive(EnumIter)]
pub enum ReportTemplate {
    Markdown,
    LogMarkdown,
}

impl ReportTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            ReportTemplate::Markdown => "report.md",
            ReportTemplate::LogMarkdown => "log_report.md",
        }
    }

    pub fn get(&self) -> StatsResult<Template<'static, 'static>> {
        Ok(TEMPLATES_ENVIRONMENT.get_template(self.name())?)
    }

    pub fn template(&self) -> &'static str {
        match self {
            ReportTemplate::Markdown => {
                "# Minecraft World Stats\n\
                \n\
                _Generated at {{ generated_at }}_\n\
                \n\
                - Total actions recorded: **{{ totals.sum }}**\n\
                - Distinct players: **{{ totals.distinct_players }}**\n\
                {% for action, count in totals.per_action|items %}\n\
                - {{ action }}: **{{ count }}**\n\
                {% endfor %}\n\
                {% for section in sections %}\n\
                \n\
                ## {{ section.title }}\n\
                | Rank | {{ section.subject_header }} | {{ section.value_header }} |\n\
                | --- | --- | --- |\n\
                {% for row in section.rows %}\n\
                | {{ row.rank }} | {{ row.subject }} | {{ row.value }} |\n\
                {% else %}\n\
                | (none) | | |\n\
                {% endfor %}\n\
                {% endfor %}\n\
                \n\
                ## Builders vs Breakers\n\
                | Rank | Player | Placed | Broken |\n\
                | --- | --- | --- | --- |\n\
                {% for row in builders_vs_breakers %}\n\
                | {{ row.rank }} | {{ row.player }} | {{ row.blocks_placed }} | {{ row.blocks_broken }} |\n\
                {% else %}\n\
                | (none) | | | |\n\
                {% endfor %}\n"
            }
            ReportTemplate::LogMarkdown => {
                "# Minecraft Server Log Stats\n\
                \n\
                _Generated at {{ generated_at }}_\n\
                \n\
                ## Top Playtime\n\
                | Rank | Player | Hours | Sessions |\n\
                | --- | --- | --- | --- |\n\
                {% for row in stats.top_playtime %}\n\
                | {{ row.rank }} | {{ row.player }} | {{ (row.seconds / 3600)|round(1) }} | {{ row.sessions }} |\n\
                {% else %}\n\
                | (none) | | | |\n\
                {% endfor %}\n\
                {% for section in sections %}\n\
                \n\
                ## {{ section.title }}\n\
                | Rank | {{ section.subject_header }} | {{ section.value_header }} |\n\
                | --- | --- | --- |\n\
                {% for row in section.rows %}\n\
                | {{ row.rank }} | {{ row.subject }} | {{ row.value }} |\n\
                {% else %}\n\
                | (none) | | |\n\
                {% endfor %}\n\
                {% endfor %}\n\
                \n\
                ## Connection Churn\n\
                | Rank | Player | Disconnects | Short Sessions |\n\
                | --- | --- | --- | --- |\n\
                {% for row in stats.connection_churn %}\n\
                | {{ row.rank }} | {{ row.player }} | {{ row.disconnects }} | {{ row.short_sessions }} |\n\
                {% else %}\n\
                | (none) | | | |\n\
                {% endfor %}\n"
            }
        }
    }
}

#[derive(Serialize)]
struct Section<'a> {
    title: &'static str,
    subject_header: &'static str,
    value_header: &'static str,
    rows: &'a [StatRow],
}

/// Human readable report, one table per leaderboard.
pub fn render_markdown(stats: &StatsSnapshot) -> StatsResult<String> {
    let sections = stats
        .leaderboards
        .iter()
        .map(|board| {
            let (subject_header, value_header) = board.category.headers();
            Section {
                title: board.category.title(),
                subject_header,
                value_header,
                rows: &board.rows,
            }
        })
        .collect::<Vec<_>>();

    let rendered = ReportTemplate::Markdown.get()?.render(context! {
        generated_at => stats.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        totals => stats.totals,
        sections => sections,
        builders_vs_breakers => stats.builders_vs_breakers,
    })?;
    Ok(rendered)
}

pub fn render_json<T: Serialize>(stats: &T) -> StatsResult<String> {
    Ok(serde_json::to_string_pretty(stats)?)
}

/// Human readable report of the server log stats.
pub fn render_log_markdown(stats: &LogStats) -> StatsResult<String> {
    let section = |title, subject_header, value_header, rows| Section {
        title,
        subject_header,
        value_header,
        rows,
    };
    let sections = [
        section("Top Advancements", "Player", "Advancements", &stats.top_advancements[..]),
        section("Top Player Deaths", "Player", "Deaths", &stats.top_player_deaths[..]),
        section("Top Death Causes", "Cause", "Events", &stats.top_death_causes[..]),
        section("Top Villager Killers", "Player", "Villagers", &stats.top_villager_killers[..]),
    ];

    let rendered = ReportTemplate::LogMarkdown.get()?.render(context! {
        generated_at => stats.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        stats => stats,
        sections => sections,
    })?;
    Ok(rendered)
}
