use anyhow::{Context, Result, bail};

use player_similarity::config::{Settings, load_dotenv};
use player_similarity::positions::Position;
use player_similarity::provider::Sources;
use player_similarity::state::{DetailPhase, Phase, similarity_percent};
use player_similarity::view_model::SimilarityViewModel;

const USAGE: &str = "usage: similar_lookup <position> <player name> [--compare <candidate>]";

fn main() -> Result<()> {
    load_dotenv();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (position, player, compare) = parse_args(&args)?;

    let settings = Settings::from_env();
    let wait = settings.lookup_wait;
    let sources = Sources::from_settings(&settings).context("build service clients")?;
    let (mut vm, _provider) = SimilarityViewModel::spawn(sources, settings.fetch_parallelism);

    vm.request_analysis(position, player.clone());
    if !vm.wait_until(wait, |s| s.phase == Phase::Ready) {
        bail!("analysis for {player} did not finish within {}s", wait.as_secs());
    }

    let state = vm.state();
    if let Some(err) = state.analysis_error.as_deref() {
        bail!("analysis failed: {err}");
    }

    println!("{player} ({})", position.label());
    println!("Fingerprint:");
    for entry in state.fingerprint.entries() {
        println!("  {:<30} {:>6.2}", entry.attribute, entry.weighted_z_score);
    }
    println!("Similar players:");
    for c in &state.candidates {
        println!(
            "  {:<28} {:>4}  {}",
            c.name,
            similarity_percent(c.similarity()),
            c.image_url.as_deref().unwrap_or("-")
        );
    }

    let Some(candidate) = compare else {
        return Ok(());
    };
    vm.select_candidate(candidate.clone());
    let settled = vm.wait_until(wait, |s| {
        matches!(
            s.detail_phase(),
            DetailPhase::ComparisonReady | DetailPhase::ComparisonUnavailable | DetailPhase::NoSelection
        )
    });
    if !settled {
        bail!("comparison with {candidate} did not finish within {}s", wait.as_secs());
    }

    let state = vm.state();
    match state.selected_comparison() {
        Some(entries) => {
            println!("{player} vs {candidate}:");
            for e in entries {
                println!(
                    "  {:<30} {:>6.1} vs {:<6.1} ({:+.1})",
                    e.stat, e.target_score, e.similar_score, e.difference
                );
            }
        }
        None => {
            let reason = state
                .comparison_errors
                .get(&candidate)
                .map(String::as_str)
                .unwrap_or("not a current candidate");
            println!("No detailed comparison data available ({reason})");
        }
    }

    Ok(())
}

fn parse_args(args: &[String]) -> Result<(Position, String, Option<String>)> {
    let mut positional = Vec::new();
    let mut compare = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--compare=") {
            compare = Some(name.trim().to_string());
        } else if arg == "--compare" {
            let Some(next) = iter.next() else {
                bail!("--compare needs a candidate name\n{USAGE}");
            };
            compare = Some(next.trim().to_string());
        } else {
            positional.push(arg.as_str());
        }
    }

    let Some((code, rest)) = positional.split_first() else {
        bail!("{USAGE}");
    };
    let position: Position = code.parse().with_context(|| USAGE.to_string())?;
    let player = rest.join(" ").trim().to_string();
    if player.is_empty() {
        bail!("{USAGE}");
    }
    Ok((position, player, compare.filter(|c| !c.is_empty())))
}
