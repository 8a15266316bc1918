use std::io::Write;
use std::path::PathBuf;

use soma_coreg::Config;
use soma_coreg::data::loader::{LevelManifest, VolumeManifest, write_raw_labels};
use soma_coreg::data::model::{Extent, Label, SamplingCoordinate, Vec3, WorldCoordinate};

const MIP: u32 = 5;
const SIZE: Extent = Extent::new(96, 96, 160);
const VOXEL_OFFSET: Vec3 = Vec3::new(40_000, 30_000, 20_000);
const FIRST_SEGMENT: Label = 864_691_135_000_000;

/// Seeded splitmix64 stream; the same seed always yields the same sample set.
struct Rng(u64);

impl Rng {
    fn unit(&mut self) -> f64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        ((z ^ (z >> 31)) >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.unit()
    }

    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let r = (-2.0 * self.unit().max(1e-15).ln()).sqrt();
        mean + std_dev * r * (std::f64::consts::TAU * self.unit()).cos()
    }
}

/// A labelled ellipsoid in local voxel coordinates of the volume.
struct Blob {
    label: Label,
    center: (f64, f64, f64),
    radius: (f64, f64, f64),
}

impl Blob {
    fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        let dx = (x - self.center.0) / self.radius.0;
        let dy = (y - self.center.1) / self.radius.1;
        let dz = (z - self.center.2) / self.radius.2;
        dx * dx + dy * dy + dz * dz <= 1.0
    }
}

/// Nanometer coordinate whose sampling coordinate is `local` inside the volume.
fn world_for(config: &Config, local: (f64, f64, f64), rng: &mut Rng) -> (f64, f64, f64) {
    let t = &config.transform;
    let sampling = (
        VOXEL_OFFSET.x as f64 + local.0,
        VOXEL_OFFSET.y as f64 + local.1,
        VOXEL_OFFSET.z as f64 + local.2,
    );
    let report = (
        sampling.0.floor() * t.sampling_factor.x as f64,
        sampling.1.floor() * t.sampling_factor.y as f64,
        sampling.2.floor() * t.sampling_factor.z as f64,
    );
    // land somewhere inside the report voxel
    (
        (report.0 - t.offset.x as f64) * t.resolution.x as f64 + rng.range(0.0, 0.9),
        (report.1 - t.offset.y as f64) * t.resolution.y as f64 + rng.range(0.0, 0.9),
        (report.2 - t.offset.z as f64) * t.resolution.z as f64 + rng.range(0.0, 0.9),
    )
}

fn main() {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    std::fs::create_dir_all(&out_dir).expect("Failed to create output directory");

    let config = Config::default();
    let transformer = config.transformer();
    let mut rng = Rng(42);

    let blobs: Vec<Blob> = (0..8)
        .map(|i| Blob {
            label: FIRST_SEGMENT + i * 7919,
            center: (
                rng.range(16.0, SIZE.dx as f64 - 16.0),
                rng.range(16.0, SIZE.dy as f64 - 16.0),
                rng.range(40.0, SIZE.dz as f64 - 40.0),
            ),
            radius: (rng.range(8.0, 18.0), rng.range(8.0, 18.0), rng.range(24.0, 60.0)),
        })
        .collect();

    // Later blobs overwrite earlier ones where they overlap.
    let mut labels = vec![0 as Label; SIZE.volume() as usize];
    for z in 0..SIZE.dz {
        for y in 0..SIZE.dy {
            for x in 0..SIZE.dx {
                let p = (x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5);
                if let Some(blob) = blobs.iter().rev().find(|b| b.contains(p.0, p.1, p.2)) {
                    labels[x + SIZE.dx * (y + SIZE.dy * z)] = blob.label;
                }
            }
        }
    }

    let raw_name = format!("mip{MIP}.raw");
    write_raw_labels(&out_dir.join(&raw_name), &labels).expect("Failed to write label data");
    let manifest = VolumeManifest {
        levels: vec![LevelManifest {
            mip: MIP,
            voxel_offset: VOXEL_OFFSET,
            size: SIZE,
            data: PathBuf::from(raw_name),
        }],
    };
    let manifest_json = serde_json::to_string_pretty(&manifest).expect("Failed to serialize manifest");
    std::fs::write(out_dir.join("volume.json"), manifest_json).expect("Failed to write manifest");

    // Points near blob centres, jittered ones near their surface, and background.
    let coords_path = out_dir.join("coordinates.csv");
    let file = std::fs::File::create(&coords_path).expect("Failed to create coordinate file");
    let mut out = std::io::BufWriter::new(file);
    let mut n_points = 0;
    for (i, blob) in blobs.iter().enumerate() {
        for k in 0..6 {
            let spread = if k < 3 { 0.15 } else { 0.9 };
            let local = (
                rng.gauss(blob.center.0, blob.radius.0 * spread).clamp(0.0, SIZE.dx as f64 - 1.0),
                rng.gauss(blob.center.1, blob.radius.1 * spread).clamp(0.0, SIZE.dy as f64 - 1.0),
                rng.gauss(blob.center.2, blob.radius.2 * spread).clamp(0.0, SIZE.dz as f64 - 1.0),
            );
            let world = world_for(&config, local, &mut rng);
            writeln!(out, "{:.1},{:.1},{:.1},cell_{i}_{k},synthetic", world.0, world.1, world.2)
                .expect("Failed to write coordinate");
            n_points += 1;
        }
    }
    for k in 0..10 {
        let local = (
            rng.range(0.0, SIZE.dx as f64),
            rng.range(0.0, SIZE.dy as f64),
            rng.range(0.0, SIZE.dz as f64),
        );
        let world = world_for(&config, local, &mut rng);
        writeln!(out, "{:.1},{:.1},{:.1},random_{k},synthetic", world.0, world.1, world.2)
            .expect("Failed to write coordinate");
        n_points += 1;
    }
    out.flush().expect("Failed to flush coordinate file");

    let check = world_for(&config, (1.0, 2.0, 3.0), &mut rng);
    let (sampling, _) = transformer.transform(WorldCoordinate(Vec3::new(
        check.0 as i64,
        check.1 as i64,
        check.2 as i64,
    )));
    assert_eq!(
        sampling,
        SamplingCoordinate(Vec3::new(VOXEL_OFFSET.x + 1, VOXEL_OFFSET.y + 2, VOXEL_OFFSET.z + 3)),
        "generated coordinates do not map back into the volume"
    );

    println!(
        "Wrote {} blobs ({SIZE} at mip {MIP}) and {n_points} coordinates to {}",
        blobs.len(),
        out_dir.display()
    );
}
