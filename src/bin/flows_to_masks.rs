use cellflow::config::{load_config, load_network_output};
use cellflow::diagnostics::SegmentationReport;
use cellflow::image::io::{save_labels_png, save_rgb_png, write_json_file};
use cellflow::image::{Grid, Image};
use cellflow::model::{ModelPreset, Precomputed, Segmenter};
use std::env;
use std::path::Path;

fn main() {
    let _ = env_logger::builder().format_timestamp(None).try_init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = load_config(Path::new(&config_path))?;

    let output = load_network_output(&config.input)?;
    let dims = output.dims();
    let network = Precomputed::new(output).map_err(|e| e.to_string())?;
    let segmenter = Segmenter::new(network, ModelPreset::from_name(&config.model));

    // predictions are already at native resolution
    let mut params = config.masks.normalize();
    params.rescale = Some(1.0);
    params.normalize = false;
    params.invert = false;
    params.tiling.tile = false;

    let image = Image::gray(Grid::new(dims)).map_err(|e| e.to_string())?;
    let result = segmenter
        .eval(&image, &params)
        .map_err(|e| format!("Segmentation failed: {e}"))?;
    let report = SegmentationReport::from_result(&result);

    save_labels_png(&result.labels, &config.output.labels_png)?;
    if let Some(path) = &config.output.flow_png {
        save_rgb_png(&result.flow_rgb, dims, path)?;
        println!("Saved flow rendering to {}", path.display());
    }
    write_json_file(&config.output.summary_json, &report)?;

    println!(
        "Saved labels to {} ({})",
        config.output.labels_png.display(),
        report.summary()
    );
    println!("Saved summary to {}", config.output.summary_json.display());
    Ok(())
}

fn usage() -> String {
    "Usage: flows_to_masks <config.json>".to_string()
}
