use crate::diagnostics::TimingBreakdown;
use crate::image::Dims;
use crate::masks::label_areas;
use crate::model::pipeline::SegmentationResult;
use serde::Serialize;

/// Serializable summary of one segmentation run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationReport {
    pub input: InputDescriptor,
    pub instances: usize,
    /// Pixel count per label, index `k - 1` for label `k`.
    pub areas: Vec<usize>,
    pub diameter: f32,
    pub rescale: f32,
    pub iterations: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub style: Vec<f32>,
    pub timings: TimingBreakdown,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
    pub flow_components: usize,
    pub has_boundary: bool,
}

impl SegmentationReport {
    pub fn from_result(result: &SegmentationResult) -> Self {
        let Dims {
            depth,
            height,
            width,
        } = result.labels.dims();
        let areas: Vec<usize> = label_areas(&result.labels).into_iter().skip(1).collect();
        Self {
            input: InputDescriptor {
                depth,
                height,
                width,
                flow_components: result.flows.ndim(),
                has_boundary: result.boundary.is_some(),
            },
            instances: areas.iter().filter(|&&a| a > 0).count(),
            areas,
            diameter: result.diameter,
            rescale: result.rescale,
            iterations: result.iterations,
            style: result.style.clone(),
            timings: result.timings.clone(),
        }
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} instances in {}x{}x{} (diameter {:.1}, {} steps, {:.1} ms)",
            self.instances,
            self.input.depth,
            self.input.height,
            self.input.width,
            self.diameter,
            self.iterations,
            self.timings.total_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FlowField;
    use crate::image::Grid;

    #[test]
    fn report_counts_instances_and_areas() {
        let dims = Dims::plane(2, 3);
        let result = SegmentationResult {
            labels: Grid::from_vec(dims, vec![1, 1, 0, 2, 0, 0]).unwrap(),
            flows: FlowField::zeros(dims, 2).unwrap(),
            flow_rgb: vec![[0.0; 3]; 6],
            scalar: Grid::new(dims),
            boundary: None,
            endpoints: Vec::new(),
            trajectories: None,
            style: Vec::new(),
            diameter: 30.0,
            rescale: 1.0,
            iterations: 200,
            timings: TimingBreakdown::with_total(3.0),
        };
        let report = SegmentationReport::from_result(&result);
        assert_eq!(report.instances, 2);
        assert_eq!(report.areas, vec![2, 1]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["input"]["flowComponents"], 2);
        assert!(json.get("style").is_none());
        assert!(report.summary().starts_with("2 instances"));
    }
}
