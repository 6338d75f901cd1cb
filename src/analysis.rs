use std::collections::HashMap;

use crate::export::FieldData;

/// Summary statistics of the dye and velocity fields at one frame.
#[derive(Debug, Clone)]
pub struct FieldMetrics {
    pub total_dye: f32,
    pub max_dye: f32,
    pub avg_dye: f32,
    pub dye_entropy: f32,
    pub total_kinetic_energy: f32,
    pub max_velocity: f32,
    pub avg_velocity: f32,
    pub velocity_divergence: f32,
    pub vorticity: f32,
    pub frame: usize,
}

/// Dye intensity of one texel: its brightest channel.
fn intensity(texel: &[f32; 4]) -> f32 {
    texel[0].max(texel[1]).max(texel[2])
}

impl FieldMetrics {
    pub fn analyze(dye: &impl FieldData, velocity: &impl FieldData, frame: usize) -> Self {
        let mut total_dye: f32 = 0.0;
        let mut max_dye: f32 = 0.0;
        let mut histogram = HashMap::new();

        for texel in dye.texels() {
            let value = intensity(texel);
            total_dye += value;
            max_dye = max_dye.max(value);

            // Quantize intensity for entropy calculation
            let bucket = (value.max(0.0) * 10.0).floor() as usize;
            *histogram.entry(bucket).or_insert(0usize) += 1;
        }

        let dye_size = dye.texels().len().max(1);
        let mut entropy = 0.0;
        for &count in histogram.values() {
            let probability = count as f32 / dye_size as f32;
            if probability > 0.0 {
                entropy -= probability * probability.log2();
            }
        }

        let width = velocity.width();
        let height = velocity.height();
        let field = velocity.texels();
        let mut total_kinetic_energy: f32 = 0.0;
        let mut max_velocity: f32 = 0.0;
        let mut velocity_sum: f32 = 0.0;
        let mut total_divergence = 0.0;
        let mut total_vorticity = 0.0;

        for texel in field {
            let magnitude = (texel[0] * texel[0] + texel[1] * texel[1]).sqrt();
            total_kinetic_energy += 0.5 * magnitude * magnitude;
            max_velocity = max_velocity.max(magnitude);
            velocity_sum += magnitude;
        }

        // Rows are stored top-down, so "up" is idx - width.
        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                let idx = y * width + x;
                let (left, right) = (field[idx - 1], field[idx + 1]);
                let (up, down) = (field[idx - width], field[idx + width]);

                let divergence = (right[0] - left[0] + up[1] - down[1]) / 2.0;
                total_divergence += divergence.abs();

                let vorticity = (right[1] - left[1] - up[0] + down[0]) / 2.0;
                total_vorticity += vorticity.abs();
            }
        }

        let velocity_size = field.len().max(1) as f32;

        Self {
            total_dye,
            max_dye,
            avg_dye: total_dye / dye_size as f32,
            dye_entropy: entropy,
            total_kinetic_energy,
            max_velocity,
            avg_velocity: velocity_sum / velocity_size,
            velocity_divergence: total_divergence / velocity_size,
            vorticity: total_vorticity / velocity_size,
            frame,
        }
    }

    pub fn print_summary(&self) {
        println!("Frame {} Metrics:", self.frame);
        println!("  Total Dye: {:.6}", self.total_dye);
        println!("  Max Dye: {:.6}", self.max_dye);
        println!("  Avg Dye: {:.6}", self.avg_dye);
        println!("  Dye Entropy: {:.6}", self.dye_entropy);
        println!("  Kinetic Energy: {:.6}", self.total_kinetic_energy);
        println!("  Max Velocity: {:.6}", self.max_velocity);
        println!("  Avg Velocity: {:.6}", self.avg_velocity);
        println!("  Velocity Divergence: {:.6}", self.velocity_divergence);
        println!("  Vorticity: {:.6}", self.vorticity);
        println!();
    }
}

#[derive(Debug, Default)]
pub struct AnalysisRecorder {
    pub metrics_history: Vec<FieldMetrics>,
}

impl AnalysisRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self, dye: &impl FieldData, velocity: &impl FieldData, frame: usize) {
        self.metrics_history
            .push(FieldMetrics::analyze(dye, velocity, frame));
    }

    pub fn print_trends(&self) {
        let (Some(first), Some(last)) = (self.metrics_history.first(), self.metrics_history.last())
        else {
            return;
        };
        if self.metrics_history.len() < 2 {
            return;
        }

        println!("=== TREND ANALYSIS ===");
        println!(
            "Dye change: {:.6} -> {:.6} ({:+.3}%)",
            first.total_dye,
            last.total_dye,
            (last.total_dye - first.total_dye) / first.total_dye.max(0.001) * 100.0
        );
        println!(
            "Kinetic Energy change: {:.6} -> {:.6} ({:+.3}%)",
            first.total_kinetic_energy,
            last.total_kinetic_energy,
            (last.total_kinetic_energy - first.total_kinetic_energy)
                / first.total_kinetic_energy.max(0.001)
                * 100.0
        );
        println!(
            "Divergence change: {:.6} -> {:.6}",
            first.velocity_divergence, last.velocity_divergence
        );
    }
}
