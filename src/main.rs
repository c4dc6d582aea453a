use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};

use fmr_rig::analysis::{self, linspace};
use fmr_rig::config::ExperimentConfig;
use fmr_rig::drivers::{Bop50, FmrRig, Hp8673, Rig, ScpiPort, SimRig, Sr830};
use fmr_rig::plot::{save_sweep_png, LivePlot, PlotStyle};
use fmr_rig::sweep::{Channel, NullMonitor, Primary, SweepEngine, SweepMonitor, SweepResult};
use fmr_rig::{recorder, FmrError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Sweep field at a fixed frequency.
    Field,
    /// Sweep frequency at a fixed field.
    Frequency,
    /// Nested 2-D sweep over both axes.
    Grid,
}

/// FMR bench automation: field/frequency sweeps with a lock-in detector.
#[derive(Parser, Debug)]
#[command(name = "fmr-rig")]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Field)]
    mode: Mode,

    /// Run against the simulated bench instead of hardware.
    #[arg(long)]
    simulate: bool,

    /// Serial port of the lock-in amplifier (RS-232).
    #[arg(long, default_value = "/dev/ttyUSB0")]
    lockin_port: String,

    /// Serial port of the power supply's GPIB bridge.
    #[arg(long, default_value = "/dev/ttyUSB1")]
    supply_port: String,

    /// Serial port of the signal generator's GPIB bridge.
    #[arg(long, default_value = "/dev/ttyUSB2")]
    source_port: String,

    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// GPIB address of the power supply.
    #[arg(long, default_value_t = 6)]
    supply_addr: u8,

    /// GPIB address of the signal generator.
    #[arg(long, default_value_t = 15)]
    source_addr: u8,

    /// Fixed RF frequency (GHz) for field sweeps, or the frequency axis start
    /// for grid/frequency sweeps.
    #[arg(long, default_value_t = 9.4)]
    freq_ghz: f64,

    /// Frequency axis stop (GHz), grid/frequency modes.
    #[arg(long, default_value_t = 12.0)]
    freq_stop_ghz: f64,

    /// Points on the frequency axis, grid/frequency modes.
    #[arg(long, default_value_t = 21)]
    freq_points: usize,

    /// Fixed field (Oe) for frequency sweeps, or the field axis start.
    #[arg(long, default_value_t = 0.0)]
    field_oe: f64,

    /// Field axis stop (Oe).
    #[arg(long, default_value_t = 4000.0)]
    field_stop_oe: f64,

    /// Points on the field axis.
    #[arg(long, default_value_t = 201)]
    field_points: usize,

    /// Channel used for the 2-D matrix (grid mode).
    #[arg(long, default_value = "X")]
    channel: String,

    /// Integrate each row of the 2-D matrix.
    #[arg(long)]
    integrate: bool,

    /// Skip the live plot; render only the final figure.
    #[arg(long)]
    no_live_plot: bool,

    /// Optional JSON file overriding the experiment defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "data")]
    out_dir: PathBuf,
}

fn connect_hardware(args: &Args, cfg: &ExperimentConfig) -> Result<FmrRig> {
    let timeout = Duration::from_secs(2);
    let lockin = ScpiPort::open("SR830", &args.lockin_port, args.baud, timeout)
        .context("opening lock-in port")?;
    let mut supply = ScpiPort::open("BOP50-8D", &args.supply_port, args.baud, timeout)
        .context("opening supply port")?;
    supply.select(args.supply_addr)?;
    let mut source = ScpiPort::open("HP8673G", &args.source_port, args.baud, timeout)
        .context("opening source port")?;
    source.select(args.source_addr)?;

    let rig = FmrRig::connect(
        Bop50::open(supply)?,
        Hp8673::open(source)?,
        Sr830::open(lockin)?,
        cfg.protection_volts,
        cfg.rf_level_db,
    )?;
    Ok(rig)
}

fn finish_sweep(args: &Args, sweep: &SweepResult, title: &str) -> Result<()> {
    if !sweep.is_complete() {
        warn!("sweep ended in fault; persisting the {} points gathered", sweep.len());
    }
    if sweep.is_empty() {
        bail!("sweep produced no data");
    }
    let csv = recorder::write_sweep(&args.out_dir, sweep)?;
    let png = csv.with_extension("png");
    save_sweep_png(&png, sweep, title, &PlotStyle::default())?;
    match analysis::sweep_midpoint(sweep, Channel::Both) {
        Ok(mid) => info!("resonance midpoint (both channels): {mid:.4}"),
        Err(e) => warn!("midpoint extraction failed: {e}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ExperimentConfig::default(),
    };

    let mut rig: Box<dyn Rig> = if args.simulate {
        info!("running against the simulated bench");
        Box::new(SimRig::new(cfg.field_per_amp))
    } else {
        Box::new(connect_hardware(&args, &cfg)?)
    };
    let engine = SweepEngine::new(cfg.sweep_settings());

    let fields = linspace(args.field_oe, args.field_stop_oe, args.field_points);
    let freqs = linspace(args.freq_ghz, args.freq_stop_ghz, args.freq_points);

    match args.mode {
        Mode::Field => {
            let title = format!(
                "Field Sweep {:.4} - {:.4} Oe @ {:.4} GHz",
                args.field_oe, args.field_stop_oe, args.freq_ghz
            );
            let mut live = LivePlot::new(args.out_dir.join("live.png"), title.clone());
            let mut null = NullMonitor;
            let monitor: &mut dyn SweepMonitor =
                if args.no_live_plot { &mut null } else { &mut live };
            let sweep = engine.sweep_field(rig.as_mut(), args.freq_ghz, &fields, monitor)?;
            finish_sweep(&args, &sweep, &title)?;
        }
        Mode::Frequency => {
            let title = format!(
                "Frequency Sweep {:.4} - {:.4} GHz @ {:.4} Oe",
                args.freq_ghz, args.freq_stop_ghz, args.field_oe
            );
            let mut live = LivePlot::new(args.out_dir.join("live.png"), title.clone());
            let mut null = NullMonitor;
            let monitor: &mut dyn SweepMonitor =
                if args.no_live_plot { &mut null } else { &mut live };
            let sweep = engine.sweep_frequency(rig.as_mut(), args.field_oe, &freqs, monitor)?;
            finish_sweep(&args, &sweep, &title)?;
        }
        Mode::Grid => {
            let channel: Channel = args.channel.parse()?;
            if channel == Channel::Both {
                return Err(FmrError::AmbiguousChannel.into());
            }
            let sweeps =
                engine.sweep_2d(rig.as_mut(), &freqs, &fields, Primary::Frequency, &mut NullMonitor)?;
            for sweep in sweeps.iter().filter(|s| !s.is_empty()) {
                recorder::write_sweep(&args.out_dir, sweep)?;
            }
            let complete: Vec<_> = sweeps.into_iter().filter(|s| s.is_complete()).collect();
            if complete.is_empty() {
                bail!("no completed rows; nothing to assemble");
            }
            let matrix = analysis::channel_matrix(&complete, channel, args.integrate)?;
            let name = format!(
                "2Dsweep_freq_{:.4}-{:.4}_GHz_field_{:.4}-{:.4}_Oe.csv",
                args.freq_ghz, args.freq_stop_ghz, args.field_oe, args.field_stop_oe
            );
            recorder::write_matrix(&args.out_dir.join(name), &matrix)?;
        }
    }
    info!("done");
    Ok(())
}
