use std::path::{Path, PathBuf};
use truck_modeling::{Point3, Vector3, builder};
use truck_stepio::out;

/// Write a 10 x 20 x 5 box as an AP203 STEP file and return its path.
pub fn write_box_step(dir: &Path, name: &str) -> PathBuf {
    let v = builder::vertex(Point3::new(0.0, 0.0, 0.0));
    let edge = builder::tsweep(&v, Vector3::new(10.0, 0.0, 0.0));
    let face = builder::tsweep(&edge, Vector3::new(0.0, 20.0, 0.0));
    let solid = builder::tsweep(&face, Vector3::new(0.0, 0.0, 5.0));

    let header = out::StepHeaderDescriptor {
        file_name: name.to_string(),
        organization_system: "step-render tests".to_string(),
        ..Default::default()
    };
    let step = out::CompleteStepDisplay::new(out::StepModel::from(&solid.compress()), header)
        .to_string();

    let path = dir.join(name);
    std::fs::write(&path, step).unwrap();
    path
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
