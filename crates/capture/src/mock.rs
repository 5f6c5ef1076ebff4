//! Mock 帧源
//!
//! 生成合成的 H.265 Annex-B 编码单元，用于无硬件环境的测试与演示。

use bytes::{BufMut, Bytes, BytesMut};
use contracts::{ContractError, Frame, FrameSource};
use tracing::{debug, trace};

use crate::pacer::Pacer;

const NAL_VPS: u8 = 32;
const NAL_SPS: u8 = 33;
const NAL_PPS: u8 = 34;
const NAL_IDR_W_RADL: u8 = 19;
const NAL_TRAIL_R: u8 = 1;

/// Mock 帧源配置
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// 帧源 ID
    pub source_id: String,

    /// 帧率 (Hz)
    pub fps: f64,

    /// 每帧负载字节数 (不含起始码与 NAL 头)
    pub frame_size: usize,

    /// 关键帧间隔
    pub gop: u64,

    /// 产生这么多帧后返回 EndOfStream
    pub max_frames: Option<u64>,

    /// 产生这么多帧后模拟设备断开
    pub disconnect_after: Option<u64>,

    /// 是否按帧率节拍阻塞
    pub paced: bool,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            source_id: "mock_camera".to_string(),
            fps: 30.0,
            frame_size: 4096,
            gop: 30,
            max_frames: None,
            disconnect_after: None,
            paced: true,
        }
    }
}

/// Mock 帧源
///
/// 按配置帧率阻塞产出合成编码帧，每 `gop` 帧附带一次参数集与 IDR。
pub struct MockFrameSource {
    config: MockSourceConfig,
    pacer: Pacer,
    produced: u64,
}

impl MockFrameSource {
    /// 创建新的 Mock 帧源
    pub fn new(config: MockSourceConfig) -> Self {
        debug!(
            source_id = %config.source_id,
            fps = config.fps,
            frame_size = config.frame_size,
            "mock frame source created"
        );
        Self {
            pacer: Pacer::new(config.fps),
            config,
            produced: 0,
        }
    }

    /// 以默认参数创建指定帧率的 Mock 帧源
    pub fn with_fps(source_id: &str, fps: f64) -> Self {
        Self::new(MockSourceConfig {
            source_id: source_id.to_string(),
            fps,
            ..Default::default()
        })
    }

    /// 已产出的帧数
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn encode_unit(&self, seq: u64) -> Bytes {
        let keyframe = self.config.gop <= 1 || (seq - 1) % self.config.gop == 0;
        let mut buf = BytesMut::with_capacity(self.config.frame_size + 64);

        if keyframe {
            for nal_type in [NAL_VPS, NAL_SPS, NAL_PPS] {
                put_nal(&mut buf, nal_type, &[0x0c, 0x01]);
            }
            put_nal_header(&mut buf, NAL_IDR_W_RADL);
        } else {
            put_nal_header(&mut buf, NAL_TRAIL_R);
        }

        // filler stays above 0x03 so no emulated start codes appear
        let fill = 0x04 + (seq % 0xf0) as u8;
        buf.put_bytes(fill, self.config.frame_size);
        buf.freeze()
    }
}

fn put_nal_header(buf: &mut BytesMut, nal_type: u8) {
    buf.put_slice(&[0, 0, 0, 1, nal_type << 1, 1]);
}

fn put_nal(buf: &mut BytesMut, nal_type: u8, payload: &[u8]) {
    put_nal_header(buf, nal_type);
    buf.put_slice(payload);
}

impl FrameSource for MockFrameSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn next_frame(&mut self) -> Result<Frame, ContractError> {
        if let Some(max) = self.config.max_frames {
            if self.produced >= max {
                return Err(ContractError::end_of_stream(&self.config.source_id));
            }
        }
        if let Some(limit) = self.config.disconnect_after {
            if self.produced >= limit {
                return Err(ContractError::device_disconnected(
                    &self.config.source_id,
                    "simulated disconnect",
                ));
            }
        }

        if self.config.paced {
            self.pacer.wait();
        }

        self.produced += 1;
        let seq = self.produced;
        let data = self.encode_unit(seq);
        trace!(source_id = %self.config.source_id, seq, bytes = data.len(), "mock frame");

        Ok(Frame::new(seq, self.pacer.elapsed_secs(), data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::{split_access_units, Codec};

    fn unpaced(config: MockSourceConfig) -> MockFrameSource {
        MockFrameSource::new(MockSourceConfig {
            paced: false,
            ..config
        })
    }

    #[test]
    fn produces_increasing_sequence() {
        let mut source = unpaced(MockSourceConfig::default());
        let a = source.next_frame().unwrap();
        let b = source.next_frame().unwrap();
        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
        assert!(b.timestamp >= a.timestamp);
    }

    #[test]
    fn keyframes_carry_parameter_sets() {
        let mut source = unpaced(MockSourceConfig {
            gop: 3,
            frame_size: 16,
            ..Default::default()
        });
        let key = source.next_frame().unwrap();
        let delta = source.next_frame().unwrap();
        assert!(key.len() > delta.len());
        assert_eq!(delta.len(), 6 + 16);

        // a keyframe is still a single access unit
        assert_eq!(split_access_units(&key.data, Codec::H265).len(), 1);
    }

    #[test]
    fn ends_after_max_frames() {
        let mut source = unpaced(MockSourceConfig {
            max_frames: Some(2),
            ..Default::default()
        });
        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_ok());
        let err = source.next_frame().unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn simulated_disconnect() {
        let mut source = unpaced(MockSourceConfig {
            disconnect_after: Some(1),
            ..Default::default()
        });
        assert!(source.next_frame().is_ok());
        let err = source.next_frame().unwrap_err();
        assert!(matches!(err, ContractError::DeviceDisconnected { .. }));
        assert_eq!(source.produced(), 1);
    }
}
