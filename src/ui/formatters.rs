use colored::*;
use humansize::{format_size, DECIMAL};

use crate::core::system_monitor::{TickReport, WarningGroup};

/// Shown in place of a sensor group whose values could not be read this tick.
pub const ERROR_TEXT: &str = "ERROR";

/// One sensor group as text.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: &'static str,
    pub lines: Vec<String>,
    /// Highlight is active for this group
    pub warning: bool,
}

impl Section {
    fn new(title: &'static str, values: &[f64], warning: bool, lines: Vec<String>) -> Self {
        let lines = if values.iter().any(|v| v.is_nan()) {
            vec![ERROR_TEXT.to_string()]
        } else {
            lines
        };
        Self {
            title,
            lines,
            warning,
        }
    }
}

/// Format a byte rate such as `1.5 MB/s`. NaN and negative rates give [`ERROR_TEXT`].
pub fn format_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec.is_nan() || bytes_per_sec < 0.0 {
        return ERROR_TEXT.to_string();
    }
    format!("{}/s", format_size(bytes_per_sec.round() as u64, DECIMAL))
}

/// Text for every sensor group of `report`, in display order.
pub fn report_sections(report: &TickReport) -> Vec<Section> {
    let flags = report.warnings;
    let mut sections = Vec::with_capacity(7);

    let cpu = &report.cpu;
    sections.push(Section::new(
        "CPU",
        &[cpu.usage_percent, cpu.queue, cpu.interrupt_percent],
        flags.get(WarningGroup::Cpu),
        vec![
            format!("{:.1}%", cpu.usage_percent),
            format!("{} queued", cpu.queue),
            format!("{:.1}% interrupt", cpu.interrupt_percent),
        ],
    ));

    let mem = &report.memory;
    sections.push(Section::new(
        "Memory",
        &[mem.free_gib, mem.commit_percent, mem.pressure_percent],
        flags.get(WarningGroup::Memory),
        vec![
            format!("{:.2} GiB free", mem.free_gib),
            format!("{:.1}% commit", mem.commit_percent),
            format!("{:.1}% pressure", mem.pressure_percent),
        ],
    ));

    let disk = &report.disk;
    sections.push(Section::new(
        "NVM IO",
        &[
            disk.bytes_per_sec,
            disk.transfers_per_sec,
            disk.max_latency_ms,
            disk.split_io_per_sec,
            disk.queue,
        ],
        flags.get(WarningGroup::Disk),
        vec![
            format_rate(disk.bytes_per_sec),
            format!("{:.1} transfers", disk.transfers_per_sec),
            format!("{:.1}ms delay", disk.max_latency_ms),
            format!("{:.2} splits", disk.split_io_per_sec),
            format!("{} queued", disk.queue),
        ],
    ));

    let pf = &report.page_faults;
    sections.push(Section::new(
        "Page faults",
        &[pf.faults_per_sec, pf.reads_per_sec],
        false,
        vec![
            format!("{:.1} reads/sec", pf.reads_per_sec),
            format!("{:.2}% hard faults", pf.hard_fault_ratio * 100.0),
            format!("{:.2}% NVM use", pf.nvm_share * 100.0),
        ],
    ));

    let net = &report.network;
    if let Some(interface) = &net.interface {
        sections.push(Section::new(
            "Network",
            &[net.in_kbps, net.out_kbps, net.queue],
            false,
            vec![
                format!("{:.1} kB In", net.in_kbps),
                format!("{:.1} kB Out", net.out_kbps),
                format!("{} queued", net.queue),
                interface.clone(),
            ],
        ));
    }

    if let Some(gpu) = &report.gpu {
        sections.push(Section::new(
            "GPU",
            &[gpu.load_percent, gpu.memory_load_percent],
            flags.get(WarningGroup::GpuLoad) || flags.get(WarningGroup::GpuMemory),
            vec![
                format!("{:.1}% load", gpu.load_percent),
                format!("{:.1}% memory", gpu.memory_load_percent),
                format!("{:.1}% controller", gpu.memory_controller_percent),
                format!("{:.0}°C", gpu.temperature_celsius),
                format!("{:.0} MHz", gpu.clock_mhz),
                format!("{:.0}% fan", gpu.fan_control_percent),
            ],
        ));
    }

    let bottleneck = &report.bottleneck;
    let label = match bottleneck.dominant {
        Some(domain) => domain.label().to_string(),
        None => "---".to_string(),
    };
    let mut lines = vec![
        label,
        format!("MEM: {:.1}", bottleneck.memory),
        format!("NVM: {:.1}", bottleneck.disk),
        format!("CPU: {:.1}", bottleneck.cpu),
    ];
    if let Some(gpu) = bottleneck.gpu {
        lines.push(format!("GPU: {:.1}", gpu));
    }
    sections.push(Section {
        title: "Bottleneck",
        lines,
        warning: flags.get(WarningGroup::Bottleneck),
    });

    sections
}

/// Console block for one tick, with active warning groups highlighted.
pub fn render_report(report: &TickReport) -> String {
    let mut out = format!(
        "{} #{}\n",
        report
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S")
            .to_string()
            .dimmed(),
        report.sequence
    );

    for section in report_sections(report) {
        let title = if section.warning {
            section.title.bold().black().on_yellow()
        } else {
            section.title.bold().green()
        };
        let body = section.lines.join(" | ");
        let body = if section.lines == [ERROR_TEXT] {
            body.red().to_string()
        } else {
            body
        };
        out.push_str(&format!("  {:<12} {}\n", title, body));
    }

    out
}
