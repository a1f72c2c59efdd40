//! GRIB to NetCDF conversion for the forecast output.
//!
//! Decoding goes through ecCodes; writing goes through the `netcdf` crate.
//! Each GRIB message becomes one 2-D variable named after its short name,
//! level, and step, on shared latitude/longitude dimensions. Descriptive
//! global attributes identify the producing model and creation time.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use eccodes::{CodesHandle, FallibleIterator, KeyType, KeyedMessage, ProductKind};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const TITLE: &str = "Aurora Weather Forecast";
const SOURCE: &str = "ECMWF IFS initial conditions";
const MODEL: &str = "Microsoft Aurora";
const INSTITUTION: &str = "Arizona State University";

struct DecodedField {
    name: String,
    units: Option<String>,
    values: Vec<f64>,
}

struct DecodedGrid {
    ni: usize,
    nj: usize,
    latitudes: Option<Vec<f64>>,
    longitudes: Option<Vec<f64>>,
    fields: Vec<DecodedField>,
}

/// Decode `grib_path` and serialize it as NetCDF at `netcdf_path`.
pub fn convert_to_netcdf(grib_path: &Path, netcdf_path: &Path) -> Result<()> {
    info!("converting {} to NetCDF", grib_path.display());
    let grid = decode_grid(grib_path)?;
    write_netcdf(netcdf_path, &grid)
        .with_context(|| format!("write {}", netcdf_path.display()))?;
    info!(
        "NetCDF output saved to {} ({} variables, {}x{} grid)",
        netcdf_path.display(),
        grid.fields.len(),
        grid.nj,
        grid.ni
    );
    Ok(())
}

fn decode_grid(path: &Path) -> Result<DecodedGrid> {
    let mut handle = CodesHandle::new_from_file(path, ProductKind::GRIB)
        .with_context(|| format!("open {}", path.display()))?;

    let mut grid: Option<DecodedGrid> = None;
    let mut used_names: HashSet<String> = HashSet::new();

    while let Some(message) = handle.next().context("read GRIB message")? {
        let short_name = read_string(&message, "shortName")?;
        let level_type = read_string(&message, "typeOfLevel")?;
        let level = read_long(&message, "level").unwrap_or(0);
        let step = read_long(&message, "step").unwrap_or(0);
        let ni = usize::try_from(read_long(&message, "Ni")?).context("grid width")?;
        let nj = usize::try_from(read_long(&message, "Nj")?).context("grid height")?;

        if let Some(existing) = grid.as_ref() {
            if existing.ni != ni || existing.nj != nj {
                bail!(
                    "mixed grids in {}: {}x{} then {}x{} ({short_name})",
                    path.display(),
                    existing.nj,
                    existing.ni,
                    nj,
                    ni
                );
            }
        }
        let grid = grid.get_or_insert_with(|| DecodedGrid {
            ni,
            nj,
            latitudes: read_float_array(&message, "distinctLatitudes").ok(),
            longitudes: read_float_array(&message, "distinctLongitudes").ok(),
            fields: Vec::new(),
        });

        let values = read_float_array(&message, "values")
            .with_context(|| format!("decode {short_name} values"))?;
        if values.len() != ni * nj {
            bail!(
                "{short_name} has {} values for a {}x{} grid",
                values.len(),
                nj,
                ni
            );
        }

        let name = unique_name(
            field_name(&short_name, &level_type, level, step),
            &mut used_names,
        );
        debug!("decoded {short_name} ({level_type} {level}, step {step}h) as {name}");
        grid.fields.push(DecodedField {
            name,
            units: read_string(&message, "units").ok(),
            values,
        });
    }

    match grid {
        Some(grid) => Ok(grid),
        None => bail!("{} contains no decodable GRIB messages", path.display()),
    }
}

fn write_netcdf(path: &Path, grid: &DecodedGrid) -> Result<()> {
    let mut file = netcdf::create(path)?;

    file.add_attribute("title", TITLE)?;
    file.add_attribute("source", SOURCE)?;
    file.add_attribute("model", MODEL)?;
    file.add_attribute("institution", INSTITUTION)?;
    file.add_attribute("created", Utc::now().to_rfc3339().as_str())?;

    file.add_dimension("latitude", grid.nj)?;
    file.add_dimension("longitude", grid.ni)?;

    if let Some(latitudes) = grid.latitudes.as_ref().filter(|v| v.len() == grid.nj) {
        let mut var = file.add_variable::<f64>("latitude", &["latitude"])?;
        var.add_attribute("units", "degrees_north")?;
        var.put_values(latitudes, None, None)?;
    }
    if let Some(longitudes) = grid.longitudes.as_ref().filter(|v| v.len() == grid.ni) {
        let mut var = file.add_variable::<f64>("longitude", &["longitude"])?;
        var.add_attribute("units", "degrees_east")?;
        var.put_values(longitudes, None, None)?;
    }

    for field in &grid.fields {
        let mut var = file.add_variable::<f64>(&field.name, &["latitude", "longitude"])?;
        if let Some(units) = &field.units {
            var.add_attribute("units", units.as_str())?;
        }
        var.put_values(&field.values, None, None)?;
    }
    Ok(())
}

/// Variable name for one message: short name, pressure level when on an
/// isobaric surface, and step suffix for lead times past analysis.
fn field_name(short_name: &str, level_type: &str, level: i64, step: i64) -> String {
    let mut name = sanitize_name(short_name);
    if level_type == "isobaricInhPa" {
        name.push_str(&format!("_{level}"));
    }
    if step > 0 {
        name.push_str(&format!("_{step}h"));
    }
    name
}

/// NetCDF names must start with a letter or underscore; GRIB short names
/// like `10u` do not.
fn sanitize_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let leading_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !leading_ok {
        name.insert(0, 'v');
    }
    name
}

fn unique_name(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut counter = 2usize;
    loop {
        let candidate = format!("{base}_{counter}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn read_string(message: &KeyedMessage, key: &str) -> Result<String> {
    match message
        .read_key(key)
        .with_context(|| format!("read GRIB key {key}"))?
        .value
    {
        KeyType::Str(value) => Ok(value),
        other => bail!("GRIB key {key} is not a string: {other:?}"),
    }
}

fn read_long(message: &KeyedMessage, key: &str) -> Result<i64> {
    match message
        .read_key(key)
        .with_context(|| format!("read GRIB key {key}"))?
        .value
    {
        KeyType::Int(value) => Ok(value),
        other => bail!("GRIB key {key} is not an integer: {other:?}"),
    }
}

fn read_float_array(message: &KeyedMessage, key: &str) -> Result<Vec<f64>> {
    match message
        .read_key(key)
        .with_context(|| format!("read GRIB key {key}"))?
        .value
    {
        KeyType::FloatArray(values) => Ok(values),
        other => bail!("GRIB key {key} is not a float array: {other:?}"),
    }
}
