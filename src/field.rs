// field.rs — Sparse displacement field ("geo map") on the host.
//
// A grid of width × height cells. Each cell stores the source position
// that the output pixel at that cell's center should sample: absolute
// source pixels until normalized, [0, 1] fractions afterwards.
//
// cell_unit is the number of output pixels one cell spans. A component
// below 1.0 means "not resolved yet"; it is then derived from the output
// size the field is stretched over.

use log::debug;

use crate::error::{ConfigError, RemapError};

/// Source position stored in one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeoPos {
    pub x: f32,
    pub y: f32,
}

impl GeoPos {
    pub fn new(x: f32, y: f32) -> Self {
        GeoPos { x, y }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    width: u32,
    height: u32,
    cells: Vec<GeoPos>,
    cell_unit: (f32, f32),
    normalized: bool,
}

impl DisplacementField {
    /// Wrap row-major cells. The cell unit starts unresolved.
    pub fn new(width: u32, height: u32, cells: Vec<GeoPos>) -> Result<Self, RemapError> {
        if width == 0 || height == 0 {
            return Err(RemapError::Parameter("displacement field must not be empty".into()));
        }
        if cells.len() != (width * height) as usize {
            return Err(RemapError::Parameter(format!(
                "field of {width}x{height} needs {} cells, got {}",
                width * height,
                cells.len()
            )));
        }
        Ok(DisplacementField { width, height, cells, cell_unit: (0.0, 0.0), normalized: false })
    }

    /// Field whose cell centers sample the matching source position when
    /// stretched over a `src_w × src_h` output.
    pub fn identity(width: u32, height: u32, src_w: u32, src_h: u32) -> Result<Self, RemapError> {
        let mut cells = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(GeoPos::new(
                    (x as f32 + 0.5) / width as f32 * src_w as f32,
                    (y as f32 + 0.5) / height as f32 * src_h as f32,
                ));
            }
        }
        Self::new(width, height, cells)
    }

    /// Parse `width * height` whitespace-separated `x y` pairs.
    ///
    /// Lines starting with `#` are comments.
    pub fn from_text(text: &str, width: u32, height: u32) -> Result<Self, ConfigError> {
        let mut values = Vec::with_capacity((width * height * 2) as usize);
        for line in text.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            for token in line.split_whitespace() {
                let v: f32 = token
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("not a number in field table: {token:?}")))?;
                values.push(v);
            }
        }
        if values.len() != (width * height * 2) as usize {
            return Err(ConfigError::Invalid(format!(
                "field table of {width}x{height} needs {} values, got {}",
                width * height * 2,
                values.len()
            )));
        }
        let cells = values.chunks_exact(2).map(|p| GeoPos::new(p[0], p[1])).collect();
        let field = Self::new(width, height, cells).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        debug!("loaded {width}x{height} displacement field from text");
        Ok(field)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cells(&self) -> &[GeoPos] {
        &self.cells
    }

    pub fn get(&self, x: u32, y: u32) -> GeoPos {
        self.cells[(y * self.width + x) as usize]
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn cell_unit(&self) -> (f32, f32) {
        self.cell_unit
    }

    pub fn set_cell_unit(&mut self, unit_x: f32, unit_y: f32) {
        self.cell_unit = (unit_x, unit_y);
    }

    pub fn is_cell_unit_resolved(&self) -> bool {
        cell_unit_resolved(self.cell_unit)
    }

    /// Derive the cell unit from the output size if it is unresolved.
    pub fn resolve_cell_unit(&mut self, out_w: u32, out_h: u32) -> (f32, f32) {
        self.cell_unit = resolve_cell_unit(self.cell_unit, (self.width, self.height), (out_w, out_h));
        self.cell_unit
    }

    /// Divide every cell by the source size. Allowed once.
    pub fn normalize(&mut self, src_w: u32, src_h: u32) -> Result<(), RemapError> {
        if self.normalized {
            return Err(RemapError::AlreadyNormalized);
        }
        if src_w == 0 || src_h == 0 {
            return Err(RemapError::Parameter("cannot normalize against an empty source".into()));
        }
        let (sw, sh) = (src_w as f32, src_h as f32);
        for c in &mut self.cells {
            c.x /= sw;
            c.y /= sh;
        }
        self.normalized = true;
        Ok(())
    }

    /// Undo `normalize` with the given source size.
    pub fn denormalize(&mut self, src_w: u32, src_h: u32) -> Result<(), RemapError> {
        if !self.normalized {
            return Err(RemapError::Unconfigured("field is not normalized".into()));
        }
        let (sw, sh) = (src_w as f32, src_h as f32);
        for c in &mut self.cells {
            c.x *= sw;
            c.y *= sh;
        }
        self.normalized = false;
        Ok(())
    }
}

pub(crate) fn cell_unit_resolved(unit: (f32, f32)) -> bool {
    unit.0 >= 1.0 && unit.1 >= 1.0
}

/// Keep a resolved unit; otherwise stretch the field over the output.
pub(crate) fn resolve_cell_unit(unit: (f32, f32), field: (u32, u32), output: (u32, u32)) -> (f32, f32) {
    if cell_unit_resolved(unit) {
        return unit;
    }
    (output.0 as f32 / field.0 as f32, output.1 as f32 / field.1 as f32)
}
