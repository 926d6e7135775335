use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::cache::{RateDecision, RateLimiter};
use crate::canvas::Canvas;
use crate::models::{Color, Grid};

#[derive(Debug, Error)]
pub enum PixelError {
    #[error("too many requests, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// 未校验的像素写入请求
///
/// 字段保留原始 JSON 值：限流检查必须先于输入校验，
/// 所以类型错误也要等到限流之后才报告。
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PixelRequest {
    #[serde(default)]
    pub x: Value,
    #[serde(default)]
    pub y: Value,
    #[serde(default)]
    pub color: Value,
}

/// 已通过校验的像素写入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub x: usize,
    pub y: usize,
    pub color: Color,
}

impl PixelRequest {
    pub fn new(x: impl Into<Value>, y: impl Into<Value>, color: impl Into<Value>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            color: color.into(),
        }
    }

    /// 解析请求体，非 JSON 对象时得到一个必然校验失败的空请求
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    pub fn validate(&self, width: usize, height: usize) -> Result<Pixel, PixelError> {
        let x = coordinate(&self.x, width)
            .ok_or_else(|| PixelError::InvalidInput(format!("x out of range: {}", self.x)))?;
        let y = coordinate(&self.y, height)
            .ok_or_else(|| PixelError::InvalidInput(format!("y out of range: {}", self.y)))?;
        let color = self
            .color
            .as_str()
            .ok_or_else(|| PixelError::InvalidInput("color must be a string".into()))
            .and_then(|s| Color::parse(s).map_err(|e| PixelError::InvalidInput(e.to_string())))?;

        Ok(Pixel { x, y, color })
    }
}

/// 整数（包括 `5.0` 这种整值浮点）且在 `[0, limit)` 内
fn coordinate(value: &Value, limit: usize) -> Option<usize> {
    let Value::Number(n) = value else {
        return None;
    };
    let n = match n.as_u64() {
        Some(n) => n,
        None => {
            let f = n.as_f64()?;
            if f.fract() != 0.0 || f < 0.0 || f >= limit as f64 {
                return None;
            }
            f as u64
        }
    };
    usize::try_from(n).ok().filter(|n| *n < limit)
}

/// 画布服务：限流 → 校验 → 写入
#[derive(Debug, Clone)]
pub struct CanvasService {
    canvas: Arc<Canvas>,
    limiter: Arc<RateLimiter>,
}

impl CanvasService {
    pub fn new(canvas: Arc<Canvas>, limiter: Arc<RateLimiter>) -> Self {
        Self { canvas, limiter }
    }

    pub fn canvas(&self) -> &Arc<Canvas> {
        &self.canvas
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// 读取整个画布，不限流
    pub fn read_canvas(&self) -> Grid {
        self.canvas.get_all()
    }

    pub fn place_pixel(&self, client_id: &str, request: &PixelRequest) -> Result<Pixel, PixelError> {
        if let RateDecision::Denied { retry_after } = self.limiter.try_consume(client_id, 1) {
            debug!(client = client_id, ?retry_after, "pixel write rate limited");
            return Err(PixelError::RateLimited { retry_after });
        }

        let (width, height) = self.canvas.dimensions();
        let pixel = request.validate(width, height).inspect_err(|e| {
            debug!(client = client_id, "rejected pixel write: {}", e);
        })?;

        self.canvas
            .write(pixel.x, pixel.y, pixel.color)
            .map_err(|e| {
                error!(client = client_id, "canvas write failed: {}", e);
                PixelError::Internal(e.to_string())
            })?;

        Ok(pixel)
    }
}
