use crate::BinResult;
use gifplay::Canvas;
use std::path::{Path, PathBuf};

/// Saves the canvas as `frameNNNN.png` in `dir`
pub fn write_frame(dir: &Path, index: usize, canvas: &Canvas) -> BinResult<PathBuf> {
    let path = dir.join(format!("frame{index:04}.png"));
    lodepng::encode32_file(&path, canvas.pixels(), canvas.width(), canvas.height())
        .map_err(|e| format!("Can't write {}: {e}", path.display()))?;
    Ok(path)
}
