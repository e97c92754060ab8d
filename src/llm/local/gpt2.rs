//! GPT-2 decoder on candle, enough to run DialoGPT-style checkpoints.
//!
//! Hugging Face stores the projection weights as `Conv1D` (`[in, out]`), so the
//! projections below multiply without transposing. Checkpoints exported from
//! `GPT2LMHeadModel` prefix everything with `transformer.`; bare `GPT2Model`
//! exports do not, and both layouts load.

use candle_core::{ DType, Device, Module, Result, Tensor, D };
use candle_nn::{ embedding, layer_norm, ops, Embedding, LayerNorm, Linear, VarBuilder };
use serde::Deserialize;

use super::{ CausalLm, LogitsSession };

fn default_n_positions() -> usize {
    1024
}

fn default_layer_norm_epsilon() -> f64 {
    1e-5
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Gpt2Config {
    pub vocab_size: usize,
    #[serde(default = "default_n_positions")]
    pub n_positions: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    #[serde(default)]
    pub n_inner: Option<usize>,
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,
    #[serde(default)]
    pub eos_token_id: Option<u32>,
}

struct Conv1D {
    weight: Tensor,
    bias: Tensor,
}

impl Conv1D {
    fn load(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get((in_dim, out_dim), "weight")?;
        let bias = vb.get(out_dim, "bias")?;
        Ok(Self { weight, bias })
    }
}

impl Module for Conv1D {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        xs.broadcast_matmul(&self.weight)?.broadcast_add(&self.bias)
    }
}

struct Attention {
    c_attn: Conv1D,
    c_proj: Conv1D,
    n_head: usize,
    head_dim: usize,
}

impl Attention {
    fn load(config: &Gpt2Config, vb: VarBuilder) -> Result<Self> {
        let c = config.n_embd;
        Ok(Self {
            c_attn: Conv1D::load(c, 3 * c, vb.pp("c_attn"))?,
            c_proj: Conv1D::load(c, c, vb.pp("c_proj"))?,
            n_head: config.n_head,
            head_dim: c / config.n_head,
        })
    }

    fn forward(
        &self,
        xs: &Tensor,
        mask: Option<&Tensor>,
        cache: &mut Option<(Tensor, Tensor)>
    ) -> Result<Tensor> {
        let (b, t, c) = xs.dims3()?;
        let qkv = self.c_attn.forward(xs)?;
        let heads = |x: Tensor| -> Result<Tensor> {
            x.reshape((b, t, self.n_head, self.head_dim))?.transpose(1, 2)?.contiguous()
        };
        let q = heads(qkv.narrow(D::Minus1, 0, c)?)?;
        let mut k = heads(qkv.narrow(D::Minus1, c, c)?)?;
        let mut v = heads(qkv.narrow(D::Minus1, 2 * c, c)?)?;

        if let Some((past_k, past_v)) = cache.as_ref() {
            k = Tensor::cat(&[past_k, &k], 2)?;
            v = Tensor::cat(&[past_v, &v], 2)?;
        }
        *cache = Some((k.clone(), v.clone()));

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let att = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
        let att = match mask {
            Some(mask) => att.broadcast_add(mask)?,
            None => att,
        };
        let att = ops::softmax_last_dim(&att)?;
        let ys = att.matmul(&v)?.transpose(1, 2)?.reshape((b, t, c))?;
        self.c_proj.forward(&ys)
    }
}

struct Mlp {
    c_fc: Conv1D,
    c_proj: Conv1D,
}

impl Mlp {
    fn load(config: &Gpt2Config, vb: VarBuilder) -> Result<Self> {
        let inner = config.n_inner.unwrap_or(4 * config.n_embd);
        Ok(Self {
            c_fc: Conv1D::load(config.n_embd, inner, vb.pp("c_fc"))?,
            c_proj: Conv1D::load(inner, config.n_embd, vb.pp("c_proj"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        // gelu() is the tanh approximation GPT-2 was trained with
        self.c_proj.forward(&self.c_fc.forward(xs)?.gelu()?)
    }
}

struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn load(config: &Gpt2Config, vb: VarBuilder) -> Result<Self> {
        let eps = config.layer_norm_epsilon;
        Ok(Self {
            ln_1: layer_norm(config.n_embd, eps, vb.pp("ln_1"))?,
            attn: Attention::load(config, vb.pp("attn"))?,
            ln_2: layer_norm(config.n_embd, eps, vb.pp("ln_2"))?,
            mlp: Mlp::load(config, vb.pp("mlp"))?,
        })
    }

    fn forward(
        &self,
        xs: &Tensor,
        mask: Option<&Tensor>,
        cache: &mut Option<(Tensor, Tensor)>
    ) -> Result<Tensor> {
        let xs = (xs + self.attn.forward(&self.ln_1.forward(xs)?, mask, cache)?)?;
        &xs + self.mlp.forward(&self.ln_2.forward(&xs)?)?
    }
}

/// Key/value cache for one generation call.
pub struct Gpt2Cache {
    layers: Vec<Option<(Tensor, Tensor)>>,
    seq_len: usize,
}

impl Gpt2Cache {
    pub fn new(n_layer: usize) -> Self {
        Self { layers: vec![None; n_layer], seq_len: 0 }
    }
}

pub struct Gpt2 {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    lm_head: Linear,
    config: Gpt2Config,
    device: Device,
}

impl Gpt2 {
    pub fn load(vb: VarBuilder, config: &Gpt2Config) -> Result<Self> {
        if config.n_head == 0 || config.n_embd % config.n_head != 0 {
            return Err(
                candle_core::Error::Msg(
                    format!("n_embd {} is not divisible by n_head {}", config.n_embd, config.n_head)
                )
            );
        }
        let vb = if vb.contains_tensor("transformer.wte.weight") {
            vb.pp("transformer")
        } else {
            vb
        };

        let wte = embedding(config.vocab_size, config.n_embd, vb.pp("wte"))?;
        let wpe = embedding(config.n_positions, config.n_embd, vb.pp("wpe"))?;
        let blocks = (0..config.n_layer)
            .map(|i| Block::load(config, vb.pp(format!("h.{}", i))))
            .collect::<Result<Vec<_>>>()?;
        let ln_f = layer_norm(config.n_embd, config.layer_norm_epsilon, vb.pp("ln_f"))?;
        // The LM head shares its weight with the token embedding.
        let lm_head = Linear::new(wte.embeddings().clone(), None);

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            lm_head,
            config: config.clone(),
            device: vb.device().clone(),
        })
    }

    /// Runs `ids` after whatever the cache already holds and returns the
    /// logits of the last position as a `[vocab_size]` f32 tensor.
    pub fn forward(&self, ids: &[u32], cache: &mut Gpt2Cache) -> Result<Tensor> {
        let t = ids.len();
        if t == 0 {
            return Err(candle_core::Error::Msg("forward called with no tokens".into()));
        }
        let past = cache.seq_len;
        if past + t > self.config.n_positions {
            return Err(
                candle_core::Error::Msg(
                    format!(
                        "sequence length {} exceeds the {} positions of the model",
                        past + t,
                        self.config.n_positions
                    )
                )
            );
        }

        let input = Tensor::from_slice(ids, (1, t), &self.device)?;
        let positions = Tensor::arange(past as u32, (past + t) as u32, &self.device)?.unsqueeze(0)?;
        let mut xs = (self.wte.forward(&input)? + self.wpe.forward(&positions)?)?;

        let mask = if t > 1 { Some(causal_mask(t, past, &self.device)?) } else { None };
        for (block, layer_cache) in self.blocks.iter().zip(cache.layers.iter_mut()) {
            xs = block.forward(&xs, mask.as_ref(), layer_cache)?;
        }
        cache.seq_len += t;

        let xs = self.ln_f.forward(&xs)?.narrow(1, t - 1, 1)?;
        self.lm_head.forward(&xs)?.flatten_all()?.to_dtype(DType::F32)
    }
}

/// `[t, past + t]` additive mask; row `i` may attend to columns `0..=past + i`.
fn causal_mask(t: usize, past: usize, device: &Device) -> Result<Tensor> {
    let total = past + t;
    let data: Vec<f32> = (0..t)
        .flat_map(|i| {
            (0..total).map(move |j| if j > past + i { f32::NEG_INFINITY } else { 0.0 })
        })
        .collect();
    Tensor::from_vec(data, (t, total), device)
}

pub struct Gpt2Session<'a> {
    model: &'a Gpt2,
    cache: Gpt2Cache,
}

impl LogitsSession for Gpt2Session<'_> {
    fn next_logits(&mut self, tokens: &[u32]) -> crate::error::Result<Vec<f32>> {
        let logits = self.model.forward(tokens, &mut self.cache)?;
        Ok(logits.to_vec1::<f32>()?)
    }
}

impl CausalLm for Gpt2 {
    fn max_positions(&self) -> usize {
        self.config.n_positions
    }

    fn session(&self) -> crate::error::Result<Box<dyn LogitsSession + '_>> {
        Ok(
            Box::new(Gpt2Session {
                model: self,
                cache: Gpt2Cache::new(self.config.n_layer),
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::local::generate;
    use crate::llm::GenerationConfig;

    fn tiny_config() -> Gpt2Config {
        Gpt2Config {
            vocab_size: 10,
            n_positions: 16,
            n_embd: 8,
            n_layer: 2,
            n_head: 2,
            n_inner: None,
            layer_norm_epsilon: 1e-5,
            eos_token_id: Some(9),
        }
    }

    fn tiny_model() -> Gpt2 {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        Gpt2::load(vb, &tiny_config()).unwrap()
    }

    #[test]
    fn parses_hugging_face_config() {
        let json = r#"{
            "activation_function": "gelu_new",
            "vocab_size": 50257,
            "n_ctx": 1024,
            "n_positions": 1024,
            "n_embd": 768,
            "n_layer": 12,
            "n_head": 12,
            "layer_norm_epsilon": 1e-05,
            "eos_token_id": 50256
        }"#;
        let config: Gpt2Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.vocab_size, 50257);
        assert_eq!(config.n_positions, 1024);
        assert_eq!(config.n_inner, None);
        assert_eq!(config.eos_token_id, Some(50256));
    }

    #[test]
    fn rejects_indivisible_head_count() {
        let config = Gpt2Config { n_head: 3, ..tiny_config() };
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(Gpt2::load(vb, &config).is_err());
    }

    #[test]
    fn causal_mask_blocks_future_positions() {
        let mask = causal_mask(2, 1, &Device::Cpu).unwrap();
        let rows = mask.to_vec2::<f32>().unwrap();
        assert_eq!(rows[0][0], 0.0);
        assert_eq!(rows[0][1], 0.0);
        assert!(rows[0][2].is_infinite());
        assert_eq!(rows[1], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn forward_returns_one_logit_per_vocab_entry() {
        let model = tiny_model();
        let mut cache = Gpt2Cache::new(2);
        let logits = model.forward(&[1, 2, 3], &mut cache).unwrap();
        assert_eq!(logits.dims(), &[10]);
        assert_eq!(cache.seq_len, 3);

        let logits = model.forward(&[4], &mut cache).unwrap();
        assert_eq!(logits.dims(), &[10]);
        assert_eq!(cache.seq_len, 4);
    }

    #[test]
    fn forward_refuses_to_run_past_position_table() {
        let model = tiny_model();
        let mut cache = Gpt2Cache::new(2);
        let ids: Vec<u32> = (0..17).map(|i| i % 10).collect();
        assert!(model.forward(&ids, &mut cache).is_err());
    }

    #[test]
    fn generation_stops_at_the_length_cap() {
        let model = tiny_model();
        let config = GenerationConfig { max_length: 6, ..Default::default() };
        let output = generate(&model, &[1, 2], &config, 9).unwrap();
        assert_eq!(output.len(), 6);
        assert_eq!(&output[..2], &[1, 2]);
    }

    #[test]
    fn length_cap_is_clamped_to_position_table() {
        let model = tiny_model();
        let config = GenerationConfig { max_length: 1000, ..Default::default() };
        let output = generate(&model, &[1], &config, 9).unwrap();
        assert_eq!(output.len(), 16);
    }
}
