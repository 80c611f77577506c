use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer computing `act(x · W + b)`.
///
/// The layer does not own its parameters, they are handed in as a flat slice laid out as
/// `[W (dim_in x dim_out, row major), b (dim_out)]`.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output dimensions of the layer.
    /// * `act_fn` - An optional activation function applied to the weighted sums.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: None,
            z: Array2::zeros((0, dim.1)),
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Makes a forward pass through the layer, caching what the backward pass needs.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `x` - The input batch, one row per example.
    ///
    /// # Returns
    /// The layer's output or an error if the shapes don't match.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::Shape {
                what: "dense input columns",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w);
        z += &b;

        self.x = Some(x.to_owned());
        self.z = z;

        let Some(ref act_fn) = self.act_fn else {
            return Ok(self.z.clone());
        };

        Ok(self.z.mapv(|z| act_fn.f(z)))
    }

    /// Back-propagates `d`, the derivative of the loss with respect to this layer's output.
    ///
    /// The parameter gradient is *added* into `grad`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `grad` - This layer's gradient slice.
    /// * `d` - The derivative of the loss with respect to the output.
    ///
    /// # Returns
    /// The derivative of the loss with respect to the input of the last forward pass.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let x = self
            .x
            .take()
            .ok_or(MlErr::MissingForward { what: "dense layer" })?;

        if d.dim() != self.z.dim() {
            return Err(MlErr::Shape {
                what: "dense output delta rows",
                got: d.nrows(),
                expected: self.z.nrows(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw += &x.t().dot(&d);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::Shape {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}
