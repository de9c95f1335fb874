//! Helpers shared by unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::device::{Gpu, HeadlessRecorder};
use crate::pipeline::ObjectPipeline;

/// Writes a vertex/fragment pair of placeholder shader files with unique names.
pub(crate) fn shader_pair() -> (PathBuf, PathBuf) {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);

    let dir = std::env::temp_dir().join(format!("kiln-tests-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let vert = dir.join(format!("{n}.vert.wgsl"));
    let frag = dir.join(format!("{n}.frag.wgsl"));
    std::fs::write(&vert, "// vertex stage").unwrap();
    std::fs::write(&frag, "// fragment stage").unwrap();
    (vert, frag)
}

/// Headless device with the object pipeline registered.
pub(crate) fn gpu_with_object_pipeline() -> (Gpu<'static>, HeadlessRecorder) {
    let (mut gpu, recorder) = Gpu::headless();
    let (vert, frag) = shader_pair();
    assert!(gpu.add_pipeline::<ObjectPipeline>(&vert, &frag).is_ready());
    recorder.clear_calls();
    (gpu, recorder)
}
