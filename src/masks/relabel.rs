use crate::image::LabelMask;

/// Renumber nonzero labels to `1..=n` preserving their relative order.
/// Background stays 0. Applying it twice yields the same mask.
pub fn relabel_sequential(labels: &LabelMask) -> LabelMask {
    let max = labels.max_label() as usize;
    let mut present = vec![false; max + 1];
    for &l in labels.data() {
        present[l as usize] = true;
    }
    let mut lut = vec![0u32; max + 1];
    let mut next = 0u32;
    for (l, &p) in present.iter().enumerate().skip(1) {
        if p {
            next += 1;
            lut[l] = next;
        }
    }
    labels.map(|l| lut[l as usize])
}

/// Pixel count per label, indexed by label (index 0 is background).
pub fn label_areas(labels: &LabelMask) -> Vec<usize> {
    let mut counts = vec![0usize; labels.max_label() as usize + 1];
    for &l in labels.data() {
        counts[l as usize] += 1;
    }
    counts
}
