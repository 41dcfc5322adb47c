// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use core::fmt;

use arrayvec::ArrayString;
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::{i2c, spi};
use embedded_hal::digital::v2::OutputPin;
use log::{debug, error, info, warn};
use paste::paste;

use crate::command::{
    AgcCommand, Command, OemCommand, RadCommand, ResultCode, SysCommand, VidCommand,
};
use crate::control::{BusyPoll, ControlInterface, DEFAULT_ADDRESS};
use crate::error::{ControlError, Error, LibraryError};
use crate::time::Clock;
use crate::util::{lepton_u32_bytes, Buffer};
use crate::video::{
    AgcPolicy, ColorLut, CommandValue, FrameGeometry, GpioMode, VideoFormat, VideoMode,
};
use crate::vospi::{FrameRead, SyncConfig, VoSpi};

/// DRY macro for the 32-bit attribute accessors in `Lepton`.
///
/// The getter is public, the setter (`write_*`) is private as changing these values directly can
/// leave the cached video mode and frame geometry out of step with the camera.
macro_rules! command_attribute {
    { $name:ident, $command:expr, $typ:ty, $doc:literal } => {
    paste! {
        #[doc = concat!("Read ", $doc, " from the camera.")]
        pub fn $name(&mut self) -> Result<$typ, Error<E, SE, PE>> {
            self.get_value($command.into())
        }

        #[doc = concat!("Write ", $doc, " to the camera.")]
        fn [< write_ $name >](&mut self, new_value: $typ) -> Result<(), Error<E, SE, PE>> {
            self.set_value($command.into(), new_value)
        }
    }};
}

/// Timing for the power-on sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BootConfig {
    /// How long the reset line is held low.
    pub reset_pulse_us: u32,

    /// How long to leave the camera alone after releasing reset.
    pub settle_ms: u64,

    /// How long after settling the camera has to report that it has booted.
    pub boot_timeout_ms: u64,

    /// How long after booting the camera has to finish its startup calibration.
    pub calibration_timeout_ms: u64,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            // The datasheet asks for 5000 master clock cycles at 25MHz.
            reset_pulse_us: 200,
            settle_ms: 950,
            boot_timeout_ms: 5000,
            calibration_timeout_ms: 5000,
        }
    }
}

/// Everything configurable about a [`Lepton`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LeptonConfig {
    /// The I²C address of the camera. Lepton modules only use 0x2A.
    pub i2c_address: u8,

    pub boot: BootConfig,

    pub busy_poll: BusyPoll,

    pub sync: SyncConfig,

    /// The frame geometry of the attached sensor, in its power-on output format.
    pub geometry: FrameGeometry,
}

impl Default for LeptonConfig {
    fn default() -> Self {
        Self {
            i2c_address: DEFAULT_ADDRESS,
            boot: BootConfig::default(),
            busy_poll: BusyPoll::default(),
            sync: SyncConfig::default(),
            geometry: FrameGeometry::default(),
        }
    }
}

/// Where the camera is in its power-on sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// [`Lepton::boot`] hasn't been called yet.
    Uninitialized,

    /// Reset has been released, the camera must not be touched until it settles.
    InReset,

    /// Waiting for the camera to report that it has booted.
    AwaitingBus,

    /// Booted, waiting for metadata and the startup calibration.
    Booted,

    Ready,

    /// The camera booted into an unexpected mode. It needs to be reset.
    Faulted,
}

/// Identifying information read from the camera once per session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Metadata {
    serial_number: u64,
    part_number: ArrayString<32>,
    software_revision: [u8; 6],
}

impl Metadata {
    /// Decode the responses to the serial number, part number and software revision commands.
    pub fn from_responses(
        serial_number: &[u8],
        part_number: &[u8],
        software_revision: &[u8],
    ) -> Result<Self, LibraryError> {
        if serial_number.len() < 8 || software_revision.len() < 6 {
            return Err(LibraryError::InvalidData("Metadata response too short"));
        }
        let mut serial_buf = serial_number;
        let serial_number = serial_buf.get_lepton_u64();
        // The part number is an ASCII string, but each pair of characters is swapped.
        let mut swapped = [0u8; 32];
        let swapped_len = part_number.len().min(swapped.len()) & !1;
        for (dest, src) in swapped[..swapped_len]
            .chunks_exact_mut(2)
            .zip(part_number.chunks_exact(2))
        {
            dest[0] = src[1];
            dest[1] = src[0];
        }
        let end = swapped[..swapped_len]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(swapped_len);
        let text = core::str::from_utf8(&swapped[..end])
            .map_err(|_| LibraryError::InvalidData("Part number is not valid ASCII"))?;
        let part_number = ArrayString::from(text.trim_end())
            .map_err(|_| LibraryError::InvalidData("Part number is too long"))?;
        let mut revision = [0u8; 6];
        revision.copy_from_slice(&software_revision[..6]);
        Ok(Self {
            serial_number,
            part_number,
            software_revision: revision,
        })
    }

    pub fn serial_number(&self) -> u64 {
        self.serial_number
    }

    pub fn part_number(&self) -> &str {
        &self.part_number
    }

    /// The GPP and DSP software revisions, as (major, minor, build) for each.
    pub fn software_revision(&self) -> [u8; 6] {
        self.software_revision
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.software_revision;
        write!(
            f,
            "part {} serial {:#018X} software {}.{}.{}/{}.{}.{}",
            self.part_number, self.serial_number, r[0], r[1], r[2], r[3], r[4], r[5]
        )
    }
}

#[derive(Clone, Debug)]
struct Session {
    phase: Phase,

    /// When reset was released.
    reset_at: u64,

    /// When the camera first reported being booted.
    booted_at: u64,

    metadata: Option<Metadata>,

    ready_once: bool,

    video_mode: VideoMode,

    video_format: VideoFormat,
}

/// A FLIR Lepton camera module.
///
/// The camera is controlled over I²C (the "CCI") and streams video over SPI (the "VoSPI"
/// interface). Both are owned by the driver, along with the chip select and reset lines, a delay
/// provider for short blocking waits, and a [`Clock`] for longer non-blocking ones. The power
/// down line is optional, see [`with_power_down_pin`][Lepton::with_power_down_pin].
///
/// The camera needs about a second after reset before it will respond, and a little longer
/// before it is producing calibrated frames. [`boot`][Lepton::boot] starts that process, then
/// [`poll_ready`][Lepton::poll_ready] should be called periodically until it returns `true`.
#[derive(Debug)]
pub struct Lepton<I2C, SPI, CS, RST, D, C> {
    control: ControlInterface<I2C>,

    vospi: VoSpi<SPI, CS>,

    /// Reset line, active low.
    reset: RST,

    /// Power down line, active low.
    power_down: Option<RST>,

    delay: D,

    clock: C,

    boot_config: BootConfig,

    session: Session,
}

impl<I2C, SPI, CS, RST, D, C, E, SE, PE> Lepton<I2C, SPI, CS, RST, D, C>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
    SPI: spi::Transfer<u8, Error = SE>,
    CS: OutputPin<Error = PE>,
    RST: OutputPin<Error = PE>,
    D: DelayUs<u32>,
    C: Clock,
{
    /// Create a driver with the default configuration (a Lepton 3.x at address 0x2A).
    pub fn new(i2c: I2C, spi: SPI, cs: CS, reset: RST, delay: D, clock: C) -> Self {
        Self::with_config(i2c, spi, cs, reset, delay, clock, LeptonConfig::default())
    }

    pub fn with_config(
        i2c: I2C,
        spi: SPI,
        cs: CS,
        reset: RST,
        delay: D,
        clock: C,
        config: LeptonConfig,
    ) -> Self {
        Self {
            control: ControlInterface::with_busy_poll(i2c, config.i2c_address, config.busy_poll),
            vospi: VoSpi::with_config(spi, cs, config.geometry, config.sync),
            reset,
            power_down: None,
            delay,
            clock,
            boot_config: config.boot,
            session: Session {
                phase: Phase::Uninitialized,
                reset_at: 0,
                booted_at: 0,
                metadata: None,
                ready_once: false,
                video_mode: VideoMode::default(),
                video_format: VideoFormat::default(),
            },
        }
    }

    /// Use a pin connected to the camera's `PWR_DWN_L` line.
    ///
    /// It is driven high by [`boot`][Lepton::boot] and low by
    /// [`power_down`][Lepton::power_down]. Without one, the line has to be held high externally.
    pub fn with_power_down_pin(mut self, pin: RST) -> Self {
        self.power_down = Some(pin);
        self
    }

    /// Reset the camera, starting the boot sequence.
    ///
    /// This only blocks for the reset pulse, use [`poll_ready`][Lepton::poll_ready] to find out
    /// when the camera can be used. The camera comes back up in its power-on video mode and
    /// format, so the frame geometry is switched back as well.
    pub fn boot(&mut self) -> Result<(), Error<E, SE, PE>> {
        let geometry = self.vospi.geometry().with_format(VideoFormat::default());
        geometry.validate()?;
        if let Some(power_down) = self.power_down.as_mut() {
            power_down.set_high().map_err(Error::Pin)?;
        }
        self.reset.set_low().map_err(Error::Pin)?;
        self.delay.delay_us(self.boot_config.reset_pulse_us);
        self.reset.set_high().map_err(Error::Pin)?;
        self.session.reset_at = self.clock.now_ms();
        self.session.phase = Phase::InReset;
        self.session.ready_once = false;
        self.session.video_mode = VideoMode::default();
        self.session.video_format = VideoFormat::default();
        self.vospi.set_geometry(geometry)?;
        info!("Camera reset released, waiting for boot");
        Ok(())
    }

    /// Put the camera into its low power state using the power down pin.
    ///
    /// [`boot`][Lepton::boot] has to be called again before the camera can be used.
    pub fn power_down(&mut self) -> Result<(), Error<E, SE, PE>> {
        let power_down = self.power_down.as_mut().ok_or(LibraryError::InvalidState(
            "no power down pin has been configured",
        ))?;
        power_down.set_low().map_err(Error::Pin)?;
        self.session.phase = Phase::Uninitialized;
        self.session.ready_once = false;
        self.vospi.request_resync();
        info!("Camera powered down");
        Ok(())
    }

    /// Check on the boot sequence, advancing it where possible.
    ///
    /// Returns `true` once the camera has booted, its metadata has been read, and its startup
    /// calibration has finished. This never blocks for longer than a few commands.
    pub fn poll_ready(&mut self) -> Result<bool, Error<E, SE, PE>> {
        match self.session.phase {
            Phase::Uninitialized => {
                return Err(
                    LibraryError::InvalidState("boot() must be called before poll_ready()").into(),
                )
            }
            Phase::Faulted => {
                return Err(LibraryError::ProtocolViolation(
                    "camera booted into an unexpected mode, it needs to be reset",
                )
                .into())
            }
            Phase::Ready => return Ok(true),
            _ => (),
        }
        let now = self.clock.now_ms();
        let since_reset = now.saturating_sub(self.session.reset_at);
        if self.session.phase == Phase::InReset {
            if since_reset < self.boot_config.settle_ms {
                return Ok(false);
            }
            self.session.phase = Phase::AwaitingBus;
        }
        if self.session.phase == Phase::AwaitingBus {
            let boot_deadline = self.boot_config.settle_ms + self.boot_config.boot_timeout_ms;
            let status = match self.control.status() {
                Ok(status) => status,
                // The camera may not acknowledge anything until it has booted.
                Err(ControlError::Bus(_)) if since_reset < boot_deadline => {
                    debug!("Camera not responding yet");
                    return Ok(false);
                }
                Err(ControlError::Bus(_)) => {
                    error!("Camera never responded on the control bus");
                    return Err(LibraryError::Timeout("the camera to boot").into());
                }
                Err(err) => return Err(err.into()),
            };
            if !status.booted() || status.busy() {
                return if since_reset >= boot_deadline {
                    Err(LibraryError::Timeout("the camera to boot").into())
                } else {
                    Ok(false)
                };
            }
            if !status.boot_mode() {
                error!("Camera booted, but not into its normal boot mode");
                self.session.phase = Phase::Faulted;
                return Err(LibraryError::ProtocolViolation(
                    "camera booted into an unexpected mode, it needs to be reset",
                )
                .into());
            }
            info!("Camera booted after {}ms", since_reset);
            self.session.phase = Phase::Booted;
            self.session.booted_at = now;
        }
        if self.session.metadata.is_none() {
            let metadata = self.read_metadata()?;
            if metadata.serial_number() == 0 {
                warn!("Camera reported a zero serial number");
            }
            info!("Camera metadata: {}", metadata);
            self.session.metadata = Some(metadata);
        }
        let mut data = [0u8; 4];
        let result = self
            .control
            .command_get(&mut self.delay, SysCommand::FfcStatus, &mut data)?;
        if !result.is_ok() {
            error!("Reading the calibration status failed: {}", result);
        }
        result.check()?;
        let ffc_status = (&data[..]).get_lepton_i32();
        if ffc_status < 0 {
            error!("Calibration failed with status {}", ffc_status);
            return Err(LibraryError::Calibration(ffc_status).into());
        } else if ffc_status > 0 {
            let since_boot = now.saturating_sub(self.session.booted_at);
            return if since_boot >= self.boot_config.calibration_timeout_ms {
                Err(LibraryError::Timeout("startup calibration").into())
            } else {
                Ok(false)
            };
        }
        self.session.phase = Phase::Ready;
        self.session.ready_once = true;
        info!("Camera ready");
        Ok(true)
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    /// The camera's metadata, available once it has been ready at least once.
    pub fn metadata(&self) -> Option<&Metadata> {
        if self.session.ready_once {
            self.session.metadata.as_ref()
        } else {
            None
        }
    }

    fn read_metadata(&mut self) -> Result<Metadata, Error<E, SE, PE>> {
        let mut serial_number = [0u8; 8];
        self.command_get(SysCommand::SerialNumber, &mut serial_number)?
            .check()?;
        let mut part_number = [0u8; 32];
        self.command_get(OemCommand::PartNumber, &mut part_number)?
            .check()?;
        let mut software_revision = [0u8; 8];
        self.command_get(OemCommand::SoftwareRevision, &mut software_revision)?
            .check()?;
        Ok(Metadata::from_responses(
            &serial_number,
            &part_number,
            &software_revision,
        )?)
    }

    fn require_booted(&self) -> Result<(), LibraryError> {
        match self.session.phase {
            Phase::Booted | Phase::Ready => Ok(()),
            _ => Err(LibraryError::InvalidState(
                "the camera has to be booted to accept commands",
            )),
        }
    }

    /// Issue a GET command, filling `data` with the response.
    pub fn command_get<Cmd: Into<Command>>(
        &mut self,
        command: Cmd,
        data: &mut [u8],
    ) -> Result<ResultCode, Error<E, SE, PE>> {
        Ok(self.control.command_get(&mut self.delay, command, data)?)
    }

    /// Issue a SET command with the given payload.
    pub fn command_set<Cmd: Into<Command>>(
        &mut self,
        command: Cmd,
        data: &[u8],
    ) -> Result<ResultCode, Error<E, SE, PE>> {
        Ok(self.control.command_set(&mut self.delay, command, data)?)
    }

    /// Issue a RUN command.
    pub fn command_run<Cmd: Into<Command>>(
        &mut self,
        command: Cmd,
    ) -> Result<ResultCode, Error<E, SE, PE>> {
        Ok(self.control.command_run(&mut self.delay, command)?)
    }

    fn get_value<V: CommandValue>(&mut self, command: Command) -> Result<V, Error<E, SE, PE>> {
        self.require_booted()?;
        let mut data = [0u8; 4];
        self.command_get(command, &mut data)?.check()?;
        Ok(V::from_word((&data[..]).get_lepton_u32())?)
    }

    fn set_value<V: CommandValue>(
        &mut self,
        command: Command,
        new_value: V,
    ) -> Result<(), Error<E, SE, PE>> {
        self.require_booted()?;
        let data = lepton_u32_bytes(new_value.to_word());
        self.command_set(command, &data)?.check()?;
        Ok(())
    }

    /// Check that the camera is responding to commands.
    pub fn ping(&mut self) -> Result<(), Error<E, SE, PE>> {
        self.require_booted()?;
        self.command_run(SysCommand::Ping)?.check()?;
        Ok(())
    }

    /// Read the flat field correction status.
    ///
    /// Negative values are errors, zero means ready, and positive values mean a correction is in
    /// progress.
    pub fn ffc_status(&mut self) -> Result<i32, Error<E, SE, PE>> {
        self.require_booted()?;
        let mut data = [0u8; 4];
        self.command_get(SysCommand::FfcStatus, &mut data)?.check()?;
        Ok((&data[..]).get_lepton_i32())
    }

    command_attribute! {
        tlinear_enabled,
        RadCommand::TLinearEnable,
        bool,
        "whether radiometric (TLinear) output is enabled"
    }

    command_attribute! {
        agc_enabled,
        AgcCommand::Enable,
        bool,
        "whether automatic gain control is enabled"
    }

    command_attribute! {
        agc_policy,
        AgcCommand::Policy,
        AgcPolicy,
        "the AGC algorithm"
    }

    command_attribute! {
        output_format,
        VidCommand::OutputFormat,
        VideoFormat,
        "the video output format"
    }

    command_attribute! {
        color_lut,
        VidCommand::ColorLut,
        ColorLut,
        "the color lookup table used for RGB output"
    }

    command_attribute! {
        gpio_mode,
        OemCommand::GpioMode,
        GpioMode,
        "the function of the GPIO3 pin"
    }

    /// The most recently set video mode.
    pub fn video_mode(&self) -> VideoMode {
        self.session.video_mode
    }

    /// Change how the camera processes pixel values.
    ///
    /// RGB888 output only works with the AGC modes, so switching to a non-AGC mode while the
    /// output format is RGB888 is rejected.
    pub fn set_video_mode(&mut self, mode: VideoMode) -> Result<(), Error<E, SE, PE>> {
        self.require_booted()?;
        if self.session.video_format == VideoFormat::Rgb888 && !mode.uses_agc() {
            return Err(
                LibraryError::InvalidState("RGB888 output requires an AGC video mode").into(),
            );
        }
        self.write_tlinear_enabled(mode.tlinear_enabled())?;
        self.write_agc_enabled(mode.uses_agc())?;
        if let Some(policy) = mode.agc_policy() {
            self.write_agc_policy(policy)?;
        }
        debug!("Video mode changed to {:?}", mode);
        self.session.video_mode = mode;
        self.vospi.request_resync();
        Ok(())
    }

    /// The most recently set output format.
    pub fn video_format(&self) -> VideoFormat {
        self.session.video_format
    }

    /// Change the pixel format, updating the frame geometry to match.
    ///
    /// `lut` is the color lookup table for RGB888 output, it is not used for RAW14.
    pub fn set_video_format(
        &mut self,
        format: VideoFormat,
        lut: ColorLut,
    ) -> Result<(), Error<E, SE, PE>> {
        self.require_booted()?;
        if format == VideoFormat::Rgb888 && !self.session.video_mode.uses_agc() {
            return Err(
                LibraryError::InvalidState("RGB888 output requires an AGC video mode").into(),
            );
        }
        let geometry = self.vospi.geometry().with_format(format);
        geometry.validate()?;
        if format == VideoFormat::Rgb888 {
            self.write_color_lut(lut)?;
        }
        self.write_output_format(format)?;
        debug!("Video format changed to {:?}", format);
        self.session.video_format = format;
        self.vospi.set_geometry(geometry)?;
        Ok(())
    }

    /// Select the color lookup table used for RGB888 output.
    pub fn set_color_lut(&mut self, lut: ColorLut) -> Result<(), Error<E, SE, PE>> {
        self.write_color_lut(lut)
    }

    /// Make the camera pulse GPIO3 at the start of each frame.
    pub fn enable_vsync(&mut self) -> Result<(), Error<E, SE, PE>> {
        self.write_gpio_mode(GpioMode::Vsync)
    }

    pub fn geometry(&self) -> &FrameGeometry {
        self.vospi.geometry()
    }

    /// Override the frame geometry, for sensors other than the default.
    pub fn set_geometry(&mut self, geometry: FrameGeometry) -> Result<(), Error<E, SE, PE>> {
        self.vospi.set_geometry(geometry)?;
        Ok(())
    }

    pub fn sync_config(&self) -> &SyncConfig {
        self.vospi.sync_config()
    }

    pub fn set_sync_config(&mut self, config: SyncConfig) {
        self.vospi.set_sync_config(config)
    }

    /// Force the video stream to resynchronize before the next frame.
    pub fn request_resync(&mut self) {
        self.vospi.request_resync()
    }

    /// Attempt to read a frame into `buffer`.
    ///
    /// See [`VoSpi::read_frame`] for the details.
    pub fn read_frame(&mut self, buffer: &mut [u8]) -> Result<FrameRead, Error<E, SE, PE>> {
        let now = self.clock.now_ms();
        Ok(self.vospi.read_frame(now, buffer)?)
    }

    /// Give back all of the peripherals.
    #[allow(clippy::type_complexity)]
    pub fn release(self) -> (I2C, SPI, CS, RST, Option<RST>, D, C) {
        let i2c = self.control.release();
        let (spi, cs) = self.vospi.release();
        (
            i2c,
            spi,
            cs,
            self.reset,
            self.power_down,
            self.delay,
            self.clock,
        )
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use std::vec;

    use flir_lepton_test_data::frames::{frame_stream, synthetic_frame, StreamGeometry};
    use flir_lepton_test_data::{command_words, MockCci, MockPin, DEFAULT_SERIAL_NUMBER};

    use super::*;
    use crate::test::{mock_lepton, ready_lepton};
    use crate::vospi::{FrameStatus, NoFrameReason};

    macro_rules! assert_set_command {
        ($cci:expr, $index:expr, $word:expr, $value:expr) => {{
            let set_values = $cci.set_values();
            assert_eq!(set_values[$index].0, $word | command_words::SET);
            assert_eq!(
                set_values[$index].1,
                crate::util::lepton_u32_bytes($value)
            );
        }};
    }

    #[test]
    fn reset_pulse() {
        let mut harness = mock_lepton(MockCci::booted());
        harness.lepton.boot().unwrap();
        assert_eq!(*harness.reset.history(), [true, false, true]);
        // The reset pulse is the only blocking wait.
        assert_eq!(harness.clock.now_us(), 200);
        assert_eq!(harness.lepton.phase(), Phase::InReset);
    }

    #[test]
    fn poll_before_boot() {
        let mut harness = mock_lepton(MockCci::booted());
        assert!(matches!(
            harness.lepton.poll_ready(),
            Err(Error::Library(LibraryError::InvalidState(_)))
        ));
    }

    #[test]
    fn no_bus_traffic_while_settling() {
        let mut harness = mock_lepton(MockCci::booted());
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(949);
        assert!(!harness.lepton.poll_ready().unwrap());
        assert!(harness.cci.recent_operations().is_empty());
        assert_eq!(harness.lepton.phase(), Phase::InReset);
    }

    #[test]
    fn boot_to_ready() {
        let mut harness = mock_lepton(MockCci::booted());
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert!(harness.lepton.poll_ready().unwrap());
        assert_eq!(harness.lepton.phase(), Phase::Ready);
        let metadata = harness.lepton.metadata().unwrap();
        assert_eq!(metadata.serial_number(), DEFAULT_SERIAL_NUMBER);
        assert_eq!(metadata.part_number(), "500-0771-01");
        assert_eq!(
            metadata.software_revision(),
            [0x03, 0x02, 0x11, 0x05, 0x00, 0x09]
        );
        // Once ready, polling is free.
        harness.cci.clear_recent_operations();
        assert!(harness.lepton.poll_ready().unwrap());
        assert!(harness.cci.recent_operations().is_empty());
    }

    #[test]
    fn waits_for_boot_status() {
        let cci = MockCci::booted();
        // Not booted, then booted but busy, then booted
        cci.queue_status(&[0x0000, 0x0007]);
        let mut harness = mock_lepton(cci);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert!(!harness.lepton.poll_ready().unwrap());
        assert_eq!(harness.lepton.phase(), Phase::AwaitingBus);
        assert!(!harness.lepton.poll_ready().unwrap());
        assert!(harness.lepton.poll_ready().unwrap());
    }

    #[test]
    fn unresponsive_camera_times_out() {
        let cci = MockCci::booted();
        cci.fail_next(usize::MAX);
        let mut harness = mock_lepton(cci);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert!(!harness.lepton.poll_ready().unwrap());
        harness.clock.advance_ms(5000);
        assert!(matches!(
            harness.lepton.poll_ready(),
            Err(Error::Library(LibraryError::Timeout(_)))
        ));
    }

    #[test]
    fn boot_timeout() {
        let cci = MockCci::booted();
        cci.set_status(0x0000);
        let mut harness = mock_lepton(cci);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert!(!harness.lepton.poll_ready().unwrap());
        harness.clock.advance_ms(5000);
        assert!(matches!(
            harness.lepton.poll_ready(),
            Err(Error::Library(LibraryError::Timeout(_)))
        ));
    }

    #[test]
    fn wrong_boot_mode_faults() {
        let cci = MockCci::booted();
        // Booted, but the boot mode bit isn't set
        cci.set_status(0x0004);
        let mut harness = mock_lepton(cci);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert!(matches!(
            harness.lepton.poll_ready(),
            Err(Error::Library(LibraryError::ProtocolViolation(_)))
        ));
        assert_eq!(harness.lepton.phase(), Phase::Faulted);
        // Stays faulted until reset
        assert!(harness.lepton.poll_ready().is_err());
        harness.cci.set_status(0x0006);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert!(harness.lepton.poll_ready().unwrap());
    }

    #[test]
    fn calibration_in_progress() {
        let cci = MockCci::booted();
        cci.set_ffc_status(1);
        let mut harness = mock_lepton(cci);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert!(!harness.lepton.poll_ready().unwrap());
        assert_eq!(harness.lepton.phase(), Phase::Booted);
        // Metadata isn't visible until ready
        assert!(harness.lepton.metadata().is_none());
        // Metadata is only read once
        harness.cci.clear_recent_operations();
        assert!(!harness.lepton.poll_ready().unwrap());
        assert_eq!(
            *harness.cci.commands(),
            [command_words::SYS_FFC_STATUS]
        );
        harness.cci.set_ffc_status(0);
        assert!(harness.lepton.poll_ready().unwrap());
        assert!(harness.lepton.metadata().is_some());
    }

    #[test]
    fn calibration_failure() {
        let cci = MockCci::booted();
        cci.set_ffc_status(-1);
        let mut harness = mock_lepton(cci);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert_eq!(
            harness.lepton.poll_ready().unwrap_err().library_error(),
            Some(&LibraryError::Calibration(-1))
        );
    }

    #[test]
    fn calibration_timeout() {
        let cci = MockCci::booted();
        cci.set_ffc_status(2);
        let mut harness = mock_lepton(cci);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert!(!harness.lepton.poll_ready().unwrap());
        harness.clock.advance_ms(5000);
        assert!(matches!(
            harness.lepton.poll_ready(),
            Err(Error::Library(LibraryError::Timeout(_)))
        ));
    }

    #[test]
    fn metadata_decoding() {
        let metadata = Metadata::from_responses(
            b"\x00\x01\x00\x00\x00\x00\x00\x00",
            b"05-070170-\x001",
            b"\x01\x02\x03\x04\x05\x06\x00\x00",
        )
        .unwrap();
        assert_eq!(metadata.serial_number(), 1);
        assert_eq!(metadata.part_number(), "500-0771-01");
        assert_eq!(metadata.software_revision(), [1, 2, 3, 4, 5, 6]);
        assert!(Metadata::from_responses(b"\x00", b"", b"").is_err());
        assert!(Metadata::from_responses(&[0u8; 8], b"\xff\xfe", &[0u8; 8]).is_err());
    }

    #[test]
    fn commands_before_boot() {
        let mut harness = mock_lepton(MockCci::booted());
        assert!(matches!(
            harness.lepton.set_video_mode(VideoMode::AgcHeq),
            Err(Error::Library(LibraryError::InvalidState(_)))
        ));
        assert!(harness.cci.commands().is_empty());
    }

    #[test]
    fn tlinear_mode() {
        let mut harness = ready_lepton();
        harness.lepton.set_video_mode(VideoMode::TLinear).unwrap();
        assert_eq!(harness.cci.set_values().len(), 2);
        assert_set_command!(harness.cci, 0, command_words::RAD_TLINEAR_ENABLE, 1);
        assert_set_command!(harness.cci, 1, command_words::AGC_ENABLE, 0);
        assert_eq!(harness.lepton.video_mode(), VideoMode::TLinear);
    }

    #[test]
    fn agc_heq_mode() {
        let mut harness = ready_lepton();
        harness.lepton.set_video_mode(VideoMode::AgcHeq).unwrap();
        assert_eq!(harness.cci.set_values().len(), 3);
        assert_set_command!(harness.cci, 0, command_words::RAD_TLINEAR_ENABLE, 0);
        assert_set_command!(harness.cci, 1, command_words::AGC_ENABLE, 1);
        assert_set_command!(harness.cci, 2, command_words::AGC_POLICY, 1);
        // The setters round-trip through the camera
        assert_eq!(harness.lepton.agc_policy(), Ok(AgcPolicy::HistogramEqualization));
        assert_eq!(harness.lepton.agc_enabled(), Ok(true));
    }

    #[test]
    fn raw14_mode() {
        let mut harness = ready_lepton();
        harness.lepton.set_video_mode(VideoMode::Raw14).unwrap();
        assert_set_command!(harness.cci, 0, command_words::RAD_TLINEAR_ENABLE, 0);
        assert_set_command!(harness.cci, 1, command_words::AGC_ENABLE, 0);
    }

    #[test]
    fn rgb888_requires_agc() {
        let mut harness = ready_lepton();
        assert!(matches!(
            harness
                .lepton
                .set_video_format(VideoFormat::Rgb888, ColorLut::default()),
            Err(Error::Library(LibraryError::InvalidState(_)))
        ));
        assert!(harness.cci.commands().is_empty());
        assert_eq!(harness.lepton.geometry(), &FrameGeometry::LEPTON_3_RAW14);

        harness.lepton.set_video_mode(VideoMode::AgcLinear).unwrap();
        harness
            .lepton
            .set_video_format(VideoFormat::Rgb888, ColorLut::Rainbow)
            .unwrap();
        assert_set_command!(harness.cci, 3, command_words::VID_COLOR_LUT, 2);
        assert_set_command!(harness.cci, 4, command_words::VID_OUTPUT_FORMAT, 3);
        assert_eq!(harness.lepton.geometry(), &FrameGeometry::LEPTON_3_RGB888);
        assert_eq!(harness.lepton.output_format(), Ok(VideoFormat::Rgb888));
        // And back out of AGC isn't allowed while in RGB
        assert!(harness.lepton.set_video_mode(VideoMode::TLinear).is_err());
        harness
            .lepton
            .set_video_format(VideoFormat::Raw14, ColorLut::Rainbow)
            .unwrap();
        // No LUT for RAW14
        assert_eq!(harness.cci.set_values().len(), 6);
        assert_set_command!(harness.cci, 5, command_words::VID_OUTPUT_FORMAT, 7);
        assert_eq!(harness.lepton.geometry(), &FrameGeometry::LEPTON_3_RAW14);
        harness.lepton.set_video_mode(VideoMode::TLinear).unwrap();
    }

    #[test]
    fn color_lut_and_vsync() {
        let mut harness = ready_lepton();
        harness.lepton.set_color_lut(ColorLut::IceFire).unwrap();
        harness.lepton.enable_vsync().unwrap();
        assert_set_command!(harness.cci, 0, command_words::VID_COLOR_LUT, 6);
        assert_set_command!(harness.cci, 1, command_words::OEM_GPIO_MODE, 5);
        assert_eq!(harness.lepton.gpio_mode(), Ok(GpioMode::Vsync));
        assert_eq!(harness.lepton.color_lut(), Ok(ColorLut::IceFire));
    }

    #[test]
    fn command_failure_result() {
        let mut harness = ready_lepton();
        harness
            .cci
            .force_result(command_words::AGC_ENABLE | command_words::SET, -3);
        assert_eq!(
            harness
                .lepton
                .set_video_mode(VideoMode::AgcLinear)
                .unwrap_err()
                .library_error(),
            Some(&LibraryError::Command(ResultCode(-3)))
        );
        // The mode didn't change
        assert_eq!(harness.lepton.video_mode(), VideoMode::TLinear);
    }

    #[test]
    fn ping_and_ffc_status() {
        let mut harness = ready_lepton();
        harness.lepton.ping().unwrap();
        assert_eq!(harness.lepton.ffc_status(), Ok(0));
    }

    #[test]
    fn mode_change_resynchronizes() {
        let mut harness = ready_lepton();
        let geometry = *harness.lepton.geometry();
        let mut buffer = vec![0u8; geometry.stream_len()];
        // Boot scheduled a resync, let it pass.
        assert_eq!(
            harness.lepton.read_frame(&mut buffer).unwrap().status,
            FrameStatus::NoFrame(NoFrameReason::Cooldown)
        );
        harness.clock.advance_ms(185);
        let frame = synthetic_frame(geometry.stream_len(), 4);
        let stream_geometry = StreamGeometry {
            packet_payload_len: geometry.packet_payload_len,
            packets_per_segment: geometry.packets_per_segment,
            segments_per_frame: geometry.segments_per_frame,
        };
        harness
            .spi
            .push_bytes(&frame_stream(&stream_geometry, &frame));
        assert!(harness.lepton.read_frame(&mut buffer).unwrap().is_complete());
        assert_eq!(buffer, frame);

        harness.lepton.set_video_mode(VideoMode::AgcHeq).unwrap();
        assert_eq!(
            harness.lepton.read_frame(&mut buffer).unwrap().status,
            FrameStatus::NoFrame(NoFrameReason::Cooldown)
        );
    }

    #[test]
    fn release_peripherals() {
        let harness = ready_lepton();
        let (cci, _spi, _cs, _reset, power_down, _delay, _clock) = harness.lepton.release();
        assert_eq!(cci.i2c_address(), 0x2A);
        assert!(power_down.is_none());
    }

    #[test]
    fn calibration_status_error() {
        let cci = MockCci::booted();
        cci.force_result(command_words::SYS_FFC_STATUS | command_words::GET, -8);
        let mut harness = mock_lepton(cci);
        harness.lepton.boot().unwrap();
        harness.clock.advance_ms(950);
        assert_eq!(
            harness.lepton.poll_ready().unwrap_err().library_error(),
            Some(&LibraryError::Command(ResultCode(-8)))
        );
    }

    #[test]
    fn reboot_hides_metadata_until_ready() {
        let mut harness = ready_lepton();
        assert!(harness.lepton.metadata().is_some());
        harness.lepton.boot().unwrap();
        assert_eq!(harness.lepton.phase(), Phase::InReset);
        assert!(harness.lepton.metadata().is_none());
        harness.clock.advance_ms(950);
        assert!(harness.lepton.poll_ready().unwrap());
        // The cached metadata is reused rather than read again.
        assert!(!harness
            .cci
            .commands()
            .contains(&command_words::SYS_SERIAL_NUMBER));
        assert_eq!(
            harness.lepton.metadata().map(Metadata::serial_number),
            Some(DEFAULT_SERIAL_NUMBER)
        );
    }

    #[test]
    fn reboot_restores_raw14_geometry() {
        let mut harness = ready_lepton();
        harness.lepton.set_video_mode(VideoMode::AgcHeq).unwrap();
        harness
            .lepton
            .set_video_format(VideoFormat::Rgb888, ColorLut::Fusion)
            .unwrap();
        assert_eq!(harness.lepton.geometry(), &FrameGeometry::LEPTON_3_RGB888);

        harness.lepton.boot().unwrap();
        assert_eq!(harness.lepton.video_format(), VideoFormat::Raw14);
        assert_eq!(harness.lepton.video_mode(), VideoMode::default());
        assert_eq!(harness.lepton.geometry(), &FrameGeometry::LEPTON_3_RAW14);
        harness.clock.advance_ms(950);
        assert!(harness.lepton.poll_ready().unwrap());

        let geometry = FrameGeometry::LEPTON_3_RAW14;
        let mut buffer = vec![0u8; geometry.stream_len()];
        assert_eq!(
            harness.lepton.read_frame(&mut buffer).unwrap().status,
            FrameStatus::NoFrame(NoFrameReason::Cooldown)
        );
        harness.clock.advance_ms(185);
        let frame = synthetic_frame(geometry.stream_len(), 7);
        harness
            .spi
            .push_bytes(&frame_stream(&StreamGeometry::LEPTON_3_RAW14, &frame));
        assert!(harness.lepton.read_frame(&mut buffer).unwrap().is_complete());
        assert_eq!(buffer, frame);
    }

    #[test]
    fn power_down_pin() {
        let harness = mock_lepton(MockCci::booted());
        let power = MockPin::new(false);
        let mut lepton = harness.lepton.with_power_down_pin(power.clone());
        lepton.boot().unwrap();
        assert_eq!(*power.history(), [false, true]);
        harness.clock.advance_ms(950);
        assert!(lepton.poll_ready().unwrap());

        lepton.power_down().unwrap();
        assert_eq!(*power.history(), [false, true, false]);
        assert_eq!(lepton.phase(), Phase::Uninitialized);
        assert!(lepton.metadata().is_none());
        assert!(lepton.poll_ready().is_err());
        // Booting powers the camera back up.
        lepton.boot().unwrap();
        assert!(power.is_high());
        let (_cci, _spi, _cs, _reset, power_down, _delay, _clock) = lepton.release();
        assert!(power_down.is_some());
    }

    #[test]
    fn power_down_without_pin() {
        let mut harness = ready_lepton();
        assert!(matches!(
            harness.lepton.power_down(),
            Err(Error::Library(LibraryError::InvalidState(_)))
        ));
        assert_eq!(harness.lepton.phase(), Phase::Ready);
    }
}
