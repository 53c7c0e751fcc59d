use anyhow::{Context, bail};
use log::info;
use magic_eye::core_modules::utils::image_helper::image_helper::{load, save};
use magic_eye::pipeline::{MagicEye, PipelineConfig, Strategy};
use std::env;

const USAGE: &str =
    "Usage: stereogram_tester <pattern_path> <depth_path> <output_path> [width height] [sequential|parallel|auto]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        println!("{USAGE}");
        return Ok(());
    }
    let pattern_path = &args[1];
    let depth_path = &args[2];
    let output_path = &args[3];
    let mut rest = &args[4..];

    // --- 2. Image Loading ---
    let pattern = load(pattern_path).with_context(|| format!("loading pattern {pattern_path}"))?;
    let depth = load(depth_path).with_context(|| format!("loading depth map {depth_path}"))?;

    // The output defaults to the depth map's size.
    let (mut width, mut height) = depth.dimensions();
    if rest.len() >= 2 {
        width = rest[0].parse().with_context(|| format!("invalid width {:?}", rest[0]))?;
        height = rest[1].parse().with_context(|| format!("invalid height {:?}", rest[1]))?;
        rest = &rest[2..];
    }
    let strategy = match rest.first().map(String::as_str) {
        None | Some("auto") => Strategy::Auto,
        Some("sequential") => Strategy::Sequential,
        Some("parallel") => Strategy::Parallel,
        Some(other) => bail!("unknown strategy {other:?}\n{USAGE}"),
    };

    // --- 3. Pipeline Initialization ---
    let config = PipelineConfig {
        width,
        height,
        strategy,
        measure: true,
        ..PipelineConfig::default()
    };
    let mut eye: MagicEye = MagicEye::new(config);
    eye.set_pattern(pattern);
    eye.set_depth(depth);
    info!(
        "compositing {width}x{height} with period {} ({strategy:?})",
        eye.period()
    );

    // --- 4. Generation ---
    let Some(stereogram) = eye.composite_async().await? else {
        bail!("nothing to composite: the pattern tile has zero width");
    };

    // --- 5. Write Output ---
    save(output_path, &stereogram).with_context(|| format!("saving {output_path}"))?;
    println!("Processing complete. Output saved to {}", output_path);
    Ok(())
}
